// 控制通道测试用的本地WebSocket服务端与替身

use super::connector::{Connector, WsConnector, WsStream};
use crate::camera::CommandHandler;
use async_trait::async_trait;
use common::{CameraSettingsCommand, RelayError, Result};
use std::future::pending;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;

pub type ServerSide = WebSocketStream<TcpStream>;

pub async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/ws/camera/", listener.local_addr().unwrap());
    (listener, endpoint)
}

pub async fn accept(listener: &TcpListener) -> ServerSide {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// 记录收到的设置命令
#[derive(Default)]
pub struct RecordingHandler {
    pub commands: Mutex<Vec<CameraSettingsCommand>>,
}

impl CommandHandler for RecordingHandler {
    fn on_command(&self, command: CameraSettingsCommand) {
        self.commands.lock().unwrap().push(command);
    }
}

/// 永远不会完成的连接
pub struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    async fn connect(&self, _endpoint: &str) -> Result<WsStream> {
        pending().await
    }
}

/// 前 `failures` 次连接失败，之后正常连接
pub struct FlakyConnector {
    pub failures: u32,
    pub attempts: AtomicU32,
}

impl FlakyConnector {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            attempts: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl Connector for FlakyConnector {
    async fn connect(&self, endpoint: &str) -> Result<WsStream> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            return Err(RelayError::Transport(format!("refused (attempt {})", attempt)));
        }
        WsConnector.connect(endpoint).await
    }
}
