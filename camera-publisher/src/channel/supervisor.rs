use super::session::{ChannelSession, SessionState};
use crate::queue::OutboundConsumer;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// 重连监督
///
/// 每次连接失败或断开后等待固定间隔再试，间隔期间可被停止信号打断。
/// 发送队列在多次连接之间保留，断线期间入队的状态在重连后按序补发。
pub struct Supervisor {
    session: ChannelSession,
    backoff: Duration,
}

impl Supervisor {
    pub fn new(session: ChannelSession, backoff: Duration) -> Self {
        Self { session, backoff }
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.session.state()
    }

    /// 运行到 `stop` 触发，返回连接尝试次数
    pub async fn run(&self, mut queue: OutboundConsumer, stop: CancellationToken) -> u32 {
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.session.run(&mut queue, &stop).await {
                Ok(()) => break,
                Err(e) if e.is_transport() => {
                    warn!("✗ Connection attempt #{} to {} failed: {}", attempts, self.session.endpoint(), e);
                }
                Err(e) => error!("✗ Control channel error on attempt #{}: {}", attempts, e),
            }

            if stop.is_cancelled() {
                break;
            }
            info!("Retrying in {:.1}s...", self.backoff.as_secs_f32());
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = tokio::time::sleep(self.backoff) => {}
            }
        }

        info!("⏹️ Control channel stopped after {} attempt(s)", attempts);
        attempts
    }
}
