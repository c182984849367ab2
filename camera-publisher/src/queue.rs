// 发送队列
//
// 采集线程（普通OS线程）与控制通道发送任务（tokio任务）之间唯一的共享状态。
// 生产端非阻塞入队，满了直接返回 `Full`，由调用方丢弃这次状态更新；
// 消费端带超时出队，超时返回 `Empty`，以便定期检查停止信号。
// 严格FIFO，不去重、不合并。

use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    #[error("Outbound queue full")]
    Full,

    #[error("No outbound item within timeout")]
    Empty,

    #[error("Outbound queue closed")]
    Closed,
}

/// 创建容量为 `capacity` 的发送队列
///
/// `capacity` 必须大于0。
pub fn outbound_queue(capacity: usize) -> (OutboundProducer, OutboundConsumer) {
    let (tx, rx) = mpsc::channel(capacity);
    (
        OutboundProducer { tx, capacity },
        OutboundConsumer { rx },
    )
}

/// 生产端，可跨线程克隆
#[derive(Clone)]
pub struct OutboundProducer {
    tx: mpsc::Sender<Bytes>,
    capacity: usize,
}

impl OutboundProducer {
    /// 非阻塞入队
    pub fn push(&self, item: Bytes) -> Result<(), QueueError> {
        self.tx.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full,
            TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    /// 当前排队数量
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// 消费端，由控制通道发送循环独占
pub struct OutboundConsumer {
    rx: mpsc::Receiver<Bytes>,
}

impl OutboundConsumer {
    /// 等待最多 `wait` 取出一项
    pub async fn pop(&mut self, wait: Duration) -> Result<Bytes, QueueError> {
        match tokio::time::timeout(wait, self.rx.recv()).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => Err(QueueError::Closed),
            Err(_) => Err(QueueError::Empty),
        }
    }
}
