use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// 配置文件路径的环境变量
pub const CONFIG_ENV: &str = "RELAY_SERVER_CONFIG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http_host: String,
    pub http_port: u16,
    pub group_name: String,
    /// 组广播通道容量
    pub broadcast_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: "0.0.0.0".to_string(),
            http_port: 8000,
            group_name: crate::group::DEFAULT_GROUP.to_string(),
            broadcast_capacity: 256,
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
        if config.broadcast_capacity == 0 {
            anyhow::bail!("broadcast_capacity must be greater than zero");
        }
        Ok(config)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
