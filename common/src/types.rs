use crate::error::{RelayError, Result};
use crate::protocol::{CameraSettingsCommand, CameraStatus};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// 控制通道上的连接角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Publisher,
    Browser,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Browser => f.write_str("browser"),
        }
    }
}

/// 连接标识，在连接生命周期内唯一
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 文本帧（JSON）消息
///
/// 以 `type` 字段区分：
/// - `camera_status`: 后端推送给浏览器的摄像头状态
/// - `camera_setting`: 浏览器请求修改某个参数
/// - `connection_status`: 发布端在线状态
/// - `hello`: 连接建立后声明角色
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextMessage {
    CameraStatus {
        #[serde(rename = "isConnected")]
        is_connected: bool,
        brightness: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        contrast: Option<i32>,
        exposure: i32,
        focus: i32,
    },
    CameraSetting {
        setting: String,
        value: i32,
    },
    ConnectionStatus {
        #[serde(rename = "isConnected")]
        is_connected: bool,
    },
    Hello {
        role: Role,
    },
}

impl TextMessage {
    pub fn from_text(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedMessage(e.to_string()))
    }

    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 转换为二进制设置命令，仅 `camera_setting` 有对应
    pub fn to_command(&self) -> Option<CameraSettingsCommand> {
        match self {
            TextMessage::CameraSetting { setting, value } => {
                Some(CameraSettingsCommand::new(setting.clone(), *value))
            }
            _ => None,
        }
    }
}

impl From<&CameraStatus> for TextMessage {
    fn from(status: &CameraStatus) -> Self {
        TextMessage::CameraStatus {
            is_connected: status.is_connected,
            brightness: status.brightness,
            contrast: status.contrast,
            exposure: status.exposure,
            focus: status.focus,
        }
    }
}
