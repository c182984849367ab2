use crate::error::{RelayError, Result};
use bytes::Bytes;
use prost::Message;
use std::fmt;
use std::str::FromStr;

/// 曝光值在线路上放大10倍后以整数传输
pub const EXPOSURE_SCALE: f64 = 10.0;

/// 曝光编码：乘以10后截断为整数
pub fn encode_exposure(exposure: f64) -> i32 {
    (exposure * EXPOSURE_SCALE) as i32
}

/// 曝光解码：除以10.0还原为浮点
pub fn decode_exposure(raw: i32) -> f64 {
    raw as f64 / EXPOSURE_SCALE
}

/// 摄像头状态（发布端 → 后端 → 浏览器）
///
/// `contrast` 只在部分协议版本中出现，因此为可选字段。
/// `exposure` 按约定放大10倍。
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CameraStatus {
    #[prost(bool, tag = "1")]
    pub is_connected: bool,
    #[prost(int32, tag = "2")]
    pub brightness: i32,
    #[prost(int32, optional, tag = "3")]
    pub contrast: Option<i32>,
    #[prost(int32, tag = "4")]
    pub exposure: i32,
    #[prost(int32, tag = "5")]
    pub focus: i32,
    #[prost(float, tag = "6")]
    pub fps: f32,
}

impl CameraStatus {
    /// 编码为二进制帧
    pub fn encode_frame(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// 从二进制帧解码，截断或类型不匹配返回 `MalformedMessage`
    pub fn decode_frame(buf: &[u8]) -> Result<Self> {
        Ok(Self::decode(buf)?)
    }

    /// 曝光的用户侧浮点值
    pub fn exposure_value(&self) -> f64 {
        decode_exposure(self.exposure)
    }
}

/// 摄像头参数设置命令（浏览器/后端 → 发布端）
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CameraSettingsCommand {
    #[prost(string, tag = "1")]
    pub setting: String,
    #[prost(int32, tag = "2")]
    pub value: i32,
}

impl CameraSettingsCommand {
    pub fn new(setting: impl Into<String>, value: i32) -> Self {
        Self {
            setting: setting.into(),
            value,
        }
    }

    /// 构造曝光命令，值按协议放大
    pub fn exposure(exposure: f64) -> Self {
        Self::new(SettingKind::Exposure.as_str(), encode_exposure(exposure))
    }

    pub fn encode_frame(&self) -> Bytes {
        Bytes::from(self.encode_to_vec())
    }

    /// 解码命令帧；空设置名视为畸形
    pub fn decode_frame(buf: &[u8]) -> Result<Self> {
        let command = Self::decode(buf)?;
        if command.setting.is_empty() {
            return Err(RelayError::MalformedMessage(
                "settings command without setting name".to_string(),
            ));
        }
        Ok(command)
    }

    /// 解析设置名
    pub fn kind(&self) -> Result<SettingKind> {
        self.setting.parse()
    }
}

/// 可调节的摄像头参数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKind {
    Brightness,
    Contrast,
    Exposure,
    Focus,
}

impl SettingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettingKind::Brightness => "brightness",
            SettingKind::Contrast => "contrast",
            SettingKind::Exposure => "exposure",
            SettingKind::Focus => "focus",
        }
    }
}

impl FromStr for SettingKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "brightness" => Ok(SettingKind::Brightness),
            "contrast" => Ok(SettingKind::Contrast),
            "exposure" => Ok(SettingKind::Exposure),
            "focus" => Ok(SettingKind::Focus),
            other => Err(RelayError::UnknownSetting(other.to_string())),
        }
    }
}

impl fmt::Display for SettingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
