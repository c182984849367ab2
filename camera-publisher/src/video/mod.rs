// 视频帧的来源与去向
//
// 采集线程从 FrameSource 读取帧，写入 FrameSink。
// 两者都是同步接口，运行在普通OS线程上，不进入tokio运行时。

mod sink;
mod source;

pub use sink::{FrameSink, NullSink, PipeSink};
pub use source::{FrameSource, SyntheticSource};

use bytes::Bytes;

/// 一帧原始视频数据
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
}
