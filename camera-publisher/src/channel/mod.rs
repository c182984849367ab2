// 发布端控制通道
//
// Connector 建立WebSocket连接，ChannelSession 管理单次连接的收发，
// Supervisor 在连接断开后按固定间隔重连，直到收到停止信号。

mod connector;
mod session;
mod supervisor;

pub use connector::WsConnector;
pub use session::{ChannelSession, SessionState};
pub use supervisor::Supervisor;

#[cfg(test)]
pub(crate) mod test_support;
