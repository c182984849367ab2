mod config;
mod group;
mod http;

use anyhow::Result;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
        )
        .with_target(false)
        .init();

    info!("🚀 Relay server starting...");

    // 加载配置
    let config = config::Config::load()?;
    info!("✓ Configuration loaded");

    // 创建控制组
    let camera_group = group::CameraGroup::new(config.group_name.clone(), config.broadcast_capacity);
    info!("✓ Group '{}' initialized", camera_group.name());

    let http_addr = config.listen_addr();
    let http_server = http::HttpServer::new(http_addr.parse()?, camera_group);

    info!("✅ Relay server ready! Control channel at ws://{}/ws/camera/", http_addr);

    http_server
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await?;

    info!("Relay server stopped");
    Ok(())
}
