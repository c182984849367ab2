use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("Unknown camera setting: {0}")]
    UnknownSetting(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Connect timed out")]
    ConnectTimeout,

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl From<prost::DecodeError> for RelayError {
    fn from(e: prost::DecodeError) -> Self {
        RelayError::MalformedMessage(e.to_string())
    }
}

impl RelayError {
    /// 连接层错误，由重连循环处理，不应终止进程
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            RelayError::Transport(_) | RelayError::ConnectTimeout | RelayError::ConnectionClosed
        )
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
