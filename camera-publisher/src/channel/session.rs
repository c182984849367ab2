use super::connector::{transport_error, Connector, WsStream};
use crate::camera::CommandHandler;
use crate::queue::{OutboundConsumer, QueueError};
use common::{CameraSettingsCommand, RelayError, Result, Role, TextMessage};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// 等待服务端回应关闭帧的上限
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

/// 一次控制通道连接
///
/// 连接建立后先发送 `hello`，随后并发运行发送循环（队列 → 二进制帧）
/// 和接收循环（二进制设置命令 → CommandHandler）。任一方向失败即结束本次连接。
pub struct ChannelSession {
    endpoint: String,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn CommandHandler>,
    connect_timeout: Duration,
    pop_timeout: Duration,
    state: watch::Sender<SessionState>,
}

impl ChannelSession {
    pub fn new(
        endpoint: impl Into<String>,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn CommandHandler>,
        connect_timeout: Duration,
        pop_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            endpoint: endpoint.into(),
            connector,
            handler,
            connect_timeout,
            pop_timeout,
            state,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// 订阅连接状态变化
    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            debug!("Session state {:?} -> {:?}", previous, state);
        }
    }

    /// 建立一次连接并运行到结束
    ///
    /// 只有 `stop` 被触发时返回 `Ok(())`；连接失败或断开返回对应错误，由调用方决定是否重连。
    pub async fn run(&self, queue: &mut OutboundConsumer, stop: &CancellationToken) -> Result<()> {
        self.set_state(SessionState::Connecting);
        info!("Connecting to {}", self.endpoint);

        let connect = timeout(self.connect_timeout, self.connector.connect(&self.endpoint));
        let stream = tokio::select! {
            _ = stop.cancelled() => {
                self.set_state(SessionState::Disconnected);
                return Ok(());
            }
            result = connect => match result {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    self.set_state(SessionState::Disconnected);
                    return Err(e);
                }
                Err(_) => {
                    self.set_state(SessionState::Disconnected);
                    return Err(RelayError::ConnectTimeout);
                }
            },
        };

        let result = self.drive(stream, queue, stop).await;
        self.set_state(SessionState::Disconnected);
        result
    }

    async fn drive(
        &self,
        stream: WsStream,
        queue: &mut OutboundConsumer,
        stop: &CancellationToken,
    ) -> Result<()> {
        let (mut sink, mut source) = stream.split();

        let hello = TextMessage::Hello {
            role: Role::Publisher,
        }
        .to_text()?;
        sink.send(Message::Text(hello)).await.map_err(transport_error)?;

        self.set_state(SessionState::Connected);
        info!("✓ Control channel connected to {}", self.endpoint);

        let outcome = tokio::select! {
            _ = stop.cancelled() => Ok(()),
            result = send_loop(&mut sink, queue, self.pop_timeout, stop) => result,
            result = receive_loop(&mut source, self.handler.as_ref()) => result,
        };

        self.set_state(SessionState::Closing);
        // 让状态订阅者在连接拆除前看到 Closing
        tokio::task::yield_now().await;

        if outcome.is_ok() {
            close_gracefully(&mut sink, &mut source).await;
        } else if let Err(e) = sink.close().await {
            debug!("Connection already closed: {}", e);
        }
        outcome
    }
}

/// 队列 → 服务端，严格按入队顺序发送
async fn send_loop(
    sink: &mut WsSink,
    queue: &mut OutboundConsumer,
    pop_timeout: Duration,
    stop: &CancellationToken,
) -> Result<()> {
    loop {
        match queue.pop(pop_timeout).await {
            Ok(frame) => {
                sink.send(Message::Binary(frame.to_vec()))
                    .await
                    .map_err(transport_error)?;
            }
            Err(QueueError::Empty) => continue,
            Err(QueueError::Closed) | Err(QueueError::Full) => {
                // 采集线程已退出，保持连接直到停止
                debug!("Outbound queue closed, waiting for shutdown");
                stop.cancelled().await;
                return Ok(());
            }
        }
    }
}

/// 服务端 → 发布端
async fn receive_loop(source: &mut WsSource, handler: &dyn CommandHandler) -> Result<()> {
    loop {
        match source.next().await {
            Some(Ok(Message::Binary(data))) => match CameraSettingsCommand::decode_frame(&data) {
                Ok(command) => {
                    info!("Received setting {}={}", command.setting, command.value);
                    handler.on_command(command);
                }
                Err(e) => warn!("Discarded command frame ({} bytes): {}", data.len(), e),
            },
            Some(Ok(Message::Text(text))) => match TextMessage::from_text(&text) {
                Ok(message) => debug!("Relay message: {:?}", message),
                Err(e) => debug!("Ignored text frame: {}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                info!("Relay closed the connection ({:?})", frame.map(|f| f.code));
                return Err(RelayError::ConnectionClosed);
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(transport_error(e)),
            None => return Err(RelayError::ConnectionClosed),
        }
    }
}

async fn close_gracefully(sink: &mut WsSink, source: &mut WsSource) {
    let frame = CloseFrame {
        code: CloseCode::Normal,
        reason: "publisher shutting down".into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!("Close frame not sent: {}", e);
        return;
    }

    let reply = timeout(CLOSE_GRACE, async {
        while let Some(Ok(message)) = source.next().await {
            if message.is_close() {
                break;
            }
        }
    })
    .await;
    if reply.is_err() {
        debug!("Relay did not acknowledge close in time");
    }
    info!("✓ Control channel closed");
}
