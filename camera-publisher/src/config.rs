use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "CAMERA_PUBLISHER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 中继服务器控制通道地址
    pub endpoint: String,
    pub reconnect_backoff_ms: u64,
    pub connect_timeout_ms: u64,
    /// 发送循环等待队列的最长时间
    pub queue_pop_timeout_ms: u64,
    pub queue_capacity: usize,
    /// 每隔多少帧推送一次状态
    pub status_every_frames: u64,

    pub video_width: u32,
    pub video_height: u32,
    pub video_fps: u32,
    /// 视频帧写入的外部进程，例如 `["ffmpeg", "-f", "rawvideo", ...]`；为空时丢弃帧
    pub sink_command: Option<Vec<String>>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "ws://127.0.0.1:8000/ws/camera/".to_string(),
            reconnect_backoff_ms: 5000,
            connect_timeout_ms: 10_000,
            queue_pop_timeout_ms: 3000,
            queue_capacity: 64,
            status_every_frames: 30,
            video_width: 1280,
            video_height: 720,
            video_fps: 30,
            sink_command: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(Path::new(&path)),
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than zero");
        }
        if self.status_every_frames == 0 {
            anyhow::bail!("status_every_frames must be greater than zero");
        }
        if self.video_fps == 0 || self.video_width == 0 || self.video_height == 0 {
            anyhow::bail!("video dimensions and fps must be non-zero");
        }
        if let Some(cmd) = &self.sink_command {
            if cmd.is_empty() {
                anyhow::bail!("sink_command must name a program");
            }
        }
        Ok(())
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn queue_pop_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_pop_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.endpoint, "ws://127.0.0.1:8000/ws/camera/");
        assert_eq!(config.reconnect_backoff(), Duration::from_secs(5));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.queue_pop_timeout(), Duration::from_secs(3));
        assert!(config.sink_command.is_none());
    }

    #[test]
    fn test_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoint = \"ws://relay.local:8000/ws/camera/\"\nreconnect_backoff_ms = 250\nsink_command = [\"cat\"]"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.endpoint, "ws://relay.local:8000/ws/camera/");
        assert_eq!(config.reconnect_backoff(), Duration::from_millis(250));
        assert_eq!(config.sink_command, Some(vec!["cat".to_string()]));
        assert_eq!(config.queue_capacity, 64);
    }

    #[test]
    fn test_rejects_invalid_values() {
        for body in [
            "queue_capacity = 0",
            "status_every_frames = 0",
            "video_fps = 0",
            "sink_command = []",
        ] {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", body).unwrap();
            assert!(Config::from_file(file.path()).is_err(), "accepted: {}", body);
        }
    }
}
