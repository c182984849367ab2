use common::{
    decode_exposure, encode_exposure, CameraSettingsCommand, CameraStatus, RelayError, Result,
    SettingKind,
};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, warn};

/// 摄像头当前参数
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub brightness: i32,
    pub contrast: i32,
    /// 用户侧浮点曝光值（线路上×10）
    pub exposure: f64,
    pub focus: i32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            brightness: 50,
            contrast: 50,
            exposure: 10.0,
            focus: 0,
        }
    }
}

impl CameraSettings {
    /// 返回应用命令后的新参数，不修改自身
    fn with_command(&self, kind: SettingKind, value: i32) -> Self {
        let mut next = self.clone();
        match kind {
            SettingKind::Brightness => next.brightness = value,
            SettingKind::Contrast => next.contrast = value,
            SettingKind::Exposure => next.exposure = decode_exposure(value),
            SettingKind::Focus => next.focus = value,
        }
        next
    }
}

/// 摄像头硬件接口
pub trait CameraDevice: Send {
    /// 将 `settings` 中 `changed` 对应的参数下发到硬件
    fn apply(&mut self, changed: SettingKind, settings: &CameraSettings) -> Result<()>;
}

/// 只打日志的设备实现，用于无摄像头环境
pub struct LoggingDevice;

impl CameraDevice for LoggingDevice {
    fn apply(&mut self, changed: SettingKind, settings: &CameraSettings) -> Result<()> {
        match changed {
            SettingKind::Exposure => info!("[SIMULATED] Applied exposure: {:.1}", settings.exposure),
            SettingKind::Brightness => info!("[SIMULATED] Applied brightness: {}", settings.brightness),
            SettingKind::Contrast => info!("[SIMULATED] Applied contrast: {}", settings.contrast),
            SettingKind::Focus => info!("[SIMULATED] Applied focus: {}", settings.focus),
        }
        Ok(())
    }
}

struct ControlState {
    settings: CameraSettings,
    device: Box<dyn CameraDevice>,
}

/// 摄像头控制
///
/// 参数与硬件下发由独立的锁保护，与发送队列互不耦合。
/// 锁内只做参数的读-改-写和对应的硬件调用。
pub struct CameraControl {
    state: Mutex<ControlState>,
}

impl CameraControl {
    pub fn new(settings: CameraSettings, device: Box<dyn CameraDevice>) -> Self {
        Self {
            state: Mutex::new(ControlState { settings, device }),
        }
    }

    pub fn settings(&self) -> CameraSettings {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .settings
            .clone()
    }

    /// 应用一条设置命令
    ///
    /// 未知参数返回 `UnknownSetting`，硬件下发失败时参数保持不变。
    pub fn apply_command(&self, command: &CameraSettingsCommand) -> Result<SettingKind> {
        let kind = command.kind()?;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = state.settings.with_command(kind, command.value);
        state.device.apply(kind, &next)?;
        state.settings = next;
        Ok(kind)
    }

    /// 构造当前状态帧
    pub fn status(&self, fps: f32, is_connected: bool) -> CameraStatus {
        let settings = self.settings();
        CameraStatus {
            is_connected,
            brightness: settings.brightness,
            contrast: Some(settings.contrast),
            exposure: encode_exposure(settings.exposure),
            focus: settings.focus,
            fps,
        }
    }
}

/// 控制通道收到设置命令时的回调
pub trait CommandHandler: Send + Sync {
    fn on_command(&self, command: CameraSettingsCommand);
}

impl CommandHandler for CameraControl {
    fn on_command(&self, command: CameraSettingsCommand) {
        match self.apply_command(&command) {
            Ok(kind) => debug!("Setting {} updated to {}", kind, command.value),
            Err(RelayError::UnknownSetting(name)) => {
                warn!("Ignoring unknown camera setting '{}'", name);
            }
            Err(e) => error!("Failed to apply {}={}: {}", command.setting, command.value, e),
        }
    }
}
