use super::Frame;
use common::{RelayError, Result};
use std::io::Write;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// 视频帧去向
pub trait FrameSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// 结束输出，释放外部资源
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// 丢弃所有帧
pub struct NullSink;

impl FrameSink for NullSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        Ok(())
    }
}

/// 把帧写入外部进程的标准输入（例如编码推流进程）
pub struct PipeSink {
    child: Child,
    stdin: Option<ChildStdin>,
}

/// 关闭时等待子进程退出的上限
const EXIT_GRACE: Duration = Duration::from_secs(5);

impl PipeSink {
    pub fn spawn(command: &[String]) -> Result<Self> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| RelayError::Config("empty sink command".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        info!("✓ Video sink process started: {} (pid {})", program, child.id());

        Ok(Self { child, stdin })
    }
}

impl FrameSink for PipeSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let stdin = self.stdin.as_mut().ok_or(RelayError::ConnectionClosed)?;
        stdin.write_all(&frame.data)?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // 关闭stdin让子进程看到EOF
        drop(self.stdin.take());

        let deadline = Instant::now() + EXIT_GRACE;
        loop {
            if let Some(status) = self.child.try_wait()? {
                debug!("Video sink process exited: {}", status);
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!("Video sink process did not exit in time, killing it");
                self.child.kill()?;
                self.child.wait()?;
                return Ok(());
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    }
}

impl Drop for PipeSink {
    fn drop(&mut self) {
        if self.stdin.is_some() {
            let _ = self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    fn frame(sequence: u64) -> Frame {
        Frame {
            data: Bytes::from(vec![sequence as u8; 128]),
            width: 8,
            height: 8,
            sequence,
        }
    }

    #[test]
    fn test_pipe_sink_writes_to_process() {
        let mut sink = PipeSink::spawn(&["cat".to_string()]).unwrap();
        for i in 0..10 {
            sink.write_frame(&frame(i)).unwrap();
        }
        sink.close().unwrap();

        // 关闭后不能再写
        assert!(sink.write_frame(&frame(11)).is_err());
    }

    #[test]
    fn test_pipe_sink_missing_program() {
        let result = PipeSink::spawn(&["definitely-not-a-real-binary-xyz".to_string()]);
        assert!(matches!(result, Err(RelayError::IoError(_))));
        assert!(PipeSink::spawn(&[]).is_err());
    }

    #[test]
    fn test_null_sink() {
        let mut sink = NullSink;
        sink.write_frame(&frame(0)).unwrap();
        sink.close().unwrap();
    }
}
