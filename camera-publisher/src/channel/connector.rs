use async_trait::async_trait;
use common::{RelayError, Result};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::debug;

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// 建立到中继服务器的WebSocket连接
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<WsStream>;
}

pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<WsStream> {
        match tokio_tungstenite::connect_async(endpoint).await {
            Ok((stream, response)) => {
                debug!("Handshake with {} completed: {}", endpoint, response.status());
                Ok(stream)
            }
            Err(WsError::Http(response)) => Err(RelayError::Transport(format!(
                "handshake rejected with status {}",
                response.status()
            ))),
            Err(e) => Err(transport_error(e)),
        }
    }
}

/// 把tungstenite错误归类为连接层错误
pub(crate) fn transport_error(e: WsError) -> RelayError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => RelayError::ConnectionClosed,
        other => RelayError::Transport(other.to_string()),
    }
}
