// 采集循环
//
// 运行在独立的OS线程上：读帧、写入视频输出、统计帧率，
// 每隔N帧把摄像头状态编码后放入发送队列。
// 队列满时丢弃本次状态，采集不因网络慢而阻塞。

use crate::camera::CameraControl;
use crate::queue::{OutboundProducer, QueueError};
use crate::video::{FrameSink, FrameSource};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 滑动一秒窗口的帧率统计
#[derive(Debug)]
pub struct FpsCounter {
    window_start: Option<Instant>,
    frames: u32,
    fps: f32,
}

const FPS_WINDOW: Duration = Duration::from_secs(1);

impl FpsCounter {
    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
        }
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        let Some(start) = self.window_start else {
            // 第一帧只开启窗口
            self.window_start = Some(now);
            return;
        };
        self.frames += 1;

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= FPS_WINDOW {
            self.fps = self.frames as f32 / elapsed.as_secs_f32();
            self.frames = 0;
            self.window_start = Some(now);
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// 采集线程结束时的统计
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub statuses_queued: u64,
    pub statuses_dropped: u64,
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    control: Arc<CameraControl>,
    producer: OutboundProducer,
    status_every: u64,
    stop: CancellationToken,
}

impl CaptureLoop {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
        control: Arc<CameraControl>,
        producer: OutboundProducer,
        status_every: u64,
        stop: CancellationToken,
    ) -> Self {
        Self {
            source,
            sink,
            control,
            producer,
            status_every: status_every.max(1),
            stop,
        }
    }

    /// 在名为 `capture` 的线程上运行
    pub fn spawn(self) -> std::io::Result<JoinHandle<CaptureStats>> {
        thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || self.run())
    }

    pub fn run(mut self) -> CaptureStats {
        let mut stats = CaptureStats::default();
        let mut fps = FpsCounter::new();

        info!("📹 Capture loop started (status every {} frames)", self.status_every);

        while !self.stop.is_cancelled() {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("Video source ended after {} frames", stats.frames);
                    break;
                }
                Err(e) => {
                    error!("Video source failed: {}", e);
                    break;
                }
            };

            if stats.frames == 0 {
                info!("✓ First frame captured ({}x{})", frame.width, frame.height);
            }

            if let Err(e) = self.sink.write_frame(&frame) {
                error!("Video sink failed at frame {}: {}", frame.sequence, e);
                break;
            }

            fps.tick();
            stats.frames += 1;

            if stats.frames % self.status_every == 0 {
                self.push_status(fps.fps(), true, &mut stats);
            }
        }

        if let Err(e) = self.sink.close() {
            warn!("Failed to close video sink: {}", e);
        }
        // 视频源中断时连接仍在，推送离线状态；停止时由中继的离线事件通知浏览器
        if !self.stop.is_cancelled() {
            self.push_status(0.0, false, &mut stats);
        }

        info!(
            "⏹️ Capture loop stopped (frames: {}, statuses queued: {}, dropped: {})",
            stats.frames, stats.statuses_queued, stats.statuses_dropped
        );
        stats
    }

    fn push_status(&self, fps: f32, is_connected: bool, stats: &mut CaptureStats) {
        let frame = self.control.status(fps, is_connected).encode_frame();
        match self.producer.push(frame) {
            Ok(()) => stats.statuses_queued += 1,
            Err(QueueError::Full) => {
                stats.statuses_dropped += 1;
                debug!(
                    "Outbound queue full ({}/{}), status dropped",
                    self.producer.len(),
                    self.producer.capacity()
                );
            }
            Err(e) => {
                stats.statuses_dropped += 1;
                debug!("Status not queued: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraSettings, LoggingDevice};
    use crate::queue::outbound_queue;
    use crate::video::{Frame, NullSink, SyntheticSource};
    use common::{CameraStatus, RelayError, Result};

    fn control() -> Arc<CameraControl> {
        Arc::new(CameraControl::new(
            CameraSettings::default(),
            Box::new(LoggingDevice),
        ))
    }

    struct FailingSink;

    impl FrameSink for FailingSink {
        fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
            Err(RelayError::ConnectionClosed)
        }
    }

    #[test]
    fn test_fps_counter_window() {
        let mut counter = FpsCounter::new();
        let start = Instant::now();
        for i in 0..=30u32 {
            counter.tick_at(start + Duration::from_millis(i as u64 * 1000 / 30));
        }
        assert!((counter.fps() - 30.0).abs() < 0.5, "fps = {}", counter.fps());

        // 窗口未满时保持上一次的值
        counter.tick_at(start + Duration::from_millis(1100));
        assert!((counter.fps() - 30.0).abs() < 0.5);
    }

    #[test]
    fn test_status_every_n_frames_then_offline() {
        let (producer, mut consumer) = outbound_queue(16);
        let capture = CaptureLoop::new(
            Box::new(SyntheticSource::new(8, 8, 1000).with_limit(10)),
            Box::new(NullSink),
            control(),
            producer,
            3,
            CancellationToken::new(),
        );

        let stats = capture.run();
        assert_eq!(stats.frames, 10);
        // 第3、6、9帧加上结束时的离线状态
        assert_eq!(stats.statuses_queued, 4);

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let statuses: Vec<CameraStatus> = rt.block_on(async {
            let mut out = Vec::new();
            while let Ok(frame) = consumer.pop(Duration::from_millis(20)).await {
                out.push(CameraStatus::decode_frame(&frame).unwrap());
            }
            out
        });
        assert_eq!(statuses.len(), 4);
        assert!(statuses[..3].iter().all(|s| s.is_connected));
        assert!(!statuses[3].is_connected);
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (producer, _consumer) = outbound_queue(2);
        let capture = CaptureLoop::new(
            Box::new(SyntheticSource::new(8, 8, 1000).with_limit(20)),
            Box::new(NullSink),
            control(),
            producer,
            1,
            CancellationToken::new(),
        );

        let stats = capture.run();
        assert_eq!(stats.frames, 20);
        assert_eq!(stats.statuses_queued, 2);
        assert_eq!(stats.statuses_dropped, 19);
    }

    #[test]
    fn test_sink_failure_ends_loop() {
        let (producer, _consumer) = outbound_queue(4);
        let capture = CaptureLoop::new(
            Box::new(SyntheticSource::new(8, 8, 1000)),
            Box::new(FailingSink),
            control(),
            producer,
            1,
            CancellationToken::new(),
        );

        let stats = capture.run();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.statuses_queued, 1);
    }

    #[test]
    fn test_no_offline_status_after_stop() {
        let (producer, _consumer) = outbound_queue(4);
        let stop = CancellationToken::new();
        stop.cancel();
        let capture = CaptureLoop::new(
            Box::new(SyntheticSource::new(8, 8, 1000).with_limit(5)),
            Box::new(NullSink),
            control(),
            producer,
            1,
            stop,
        );

        let stats = capture.run();
        assert_eq!(stats.frames, 0);
        assert_eq!(stats.statuses_queued, 0);
    }

    #[test]
    fn test_stop_token_ends_thread() {
        let (producer, _consumer) = outbound_queue(4);
        let stop = CancellationToken::new();
        let handle = CaptureLoop::new(
            Box::new(SyntheticSource::new(8, 8, 200)),
            Box::new(NullSink),
            control(),
            producer,
            1000,
            stop.clone(),
        )
        .spawn()
        .unwrap();

        std::thread::sleep(Duration::from_millis(50));
        stop.cancel();
        let stats = handle.join().unwrap();
        assert!(stats.frames > 0);
    }
}
