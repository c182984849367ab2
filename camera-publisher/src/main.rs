mod camera;
mod capture;
mod channel;
mod config;
mod queue;
mod video;

use anyhow::{anyhow, Result};
use camera::{CameraControl, CameraSettings, LoggingDevice};
use capture::CaptureLoop;
use channel::{ChannelSession, SessionState, Supervisor, WsConnector};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use video::{FrameSink, NullSink, PipeSink, SyntheticSource};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志 - 使用环境变量 RUST_LOG 控制级别
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    info!("🎥 Camera publisher starting...");

    // 加载配置
    let config = config::Config::load()?;
    info!("✓ Configuration loaded");
    info!("  Relay endpoint: {}", config.endpoint);
    info!("  Reconnect backoff: {:?}", config.reconnect_backoff());

    let control = Arc::new(CameraControl::new(
        CameraSettings::default(),
        Box::new(LoggingDevice),
    ));
    let (producer, consumer) = queue::outbound_queue(config.queue_capacity);
    info!("✓ Outbound queue ready (capacity {})", producer.capacity());

    let sink: Box<dyn FrameSink> = match &config.sink_command {
        Some(command) => Box::new(PipeSink::spawn(command)?),
        None => {
            info!("  No video sink configured, frames will be discarded");
            Box::new(NullSink)
        }
    };
    let source = SyntheticSource::new(config.video_width, config.video_height, config.video_fps);

    let stop = CancellationToken::new();
    let capture = CaptureLoop::new(
        Box::new(source),
        sink,
        control.clone(),
        producer,
        config.status_every_frames,
        stop.clone(),
    )
    .spawn()?;

    let session = ChannelSession::new(
        config.endpoint.clone(),
        Arc::new(WsConnector),
        control,
        config.connect_timeout(),
        config.queue_pop_timeout(),
    );
    let supervisor = Supervisor::new(session, config.reconnect_backoff());

    let signal_stop = stop.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown signal received");
                signal_stop.cancel();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    let mut state = supervisor.state();
    tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow();
            debug!("Control channel state: {:?}", current);
            if current == SessionState::Disconnected {
                info!("Control channel offline, statuses will queue until reconnect");
            }
        }
    });

    info!("✅ Camera publisher ready!");
    info!("   Press Ctrl+C to stop");

    supervisor.run(consumer, stop.clone()).await;
    stop.cancel();

    let stats = tokio::task::spawn_blocking(move || capture.join())
        .await?
        .map_err(|_| anyhow!("capture thread panicked"))?;
    info!("Captured {} frames in total", stats.frames);

    info!("👋 Camera publisher stopped");
    Ok(())
}
