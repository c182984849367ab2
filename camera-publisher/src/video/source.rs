use super::Frame;
use bytes::Bytes;
use common::Result;
use std::time::{Duration, Instant};
use tracing::info;

/// 视频帧来源
pub trait FrameSource: Send {
    /// 阻塞直到下一帧可用；`Ok(None)` 表示流结束
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// 合成视频源（无摄像头时使用）
///
/// 输出 YUV420 灰阶条纹帧，按目标帧率节拍。
pub struct SyntheticSource {
    width: u32,
    height: u32,
    interval: Duration,
    patterns: [Bytes; 2],
    sequence: u64,
    limit: Option<u64>,
    next_due: Option<Instant>,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        info!("🎥 Creating synthetic video source (MOCK MODE)");
        info!("  Resolution: {}x{} @ {} fps", width, height, fps);

        let interval = Duration::from_secs_f64(1.0 / fps.max(1) as f64);
        Self {
            width,
            height,
            interval,
            patterns: [stripes(width, height, 0), stripes(width, height, 1)],
            sequence: 0,
            limit: None,
            next_due: None,
        }
    }

    /// 产生 `frames` 帧后结束
    pub fn with_limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }
}

/// 生成一帧条纹，`phase` 控制条纹相位
fn stripes(width: u32, height: u32, phase: usize) -> Bytes {
    let luma = (width * height) as usize;
    let mut data = Vec::with_capacity(luma * 3 / 2);
    for i in 0..luma {
        let column = i % width as usize;
        data.push(if (column / 32 + phase) % 2 == 0 { 0x30 } else { 0xd0 });
    }
    // 色度平面置中性值
    data.resize(luma * 3 / 2, 0x80);
    Bytes::from(data)
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            return Ok(None);
        }

        let now = Instant::now();
        let due = self.next_due.unwrap_or(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        // 落后太多时不追帧
        self.next_due = Some(due.max(now) + self.interval);

        let frame = Frame {
            data: self.patterns[(self.sequence / 15 % 2) as usize].clone(),
            width: self.width,
            height: self.height,
            sequence: self.sequence,
        };
        self.sequence += 1;
        Ok(Some(frame))
    }
}
