use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::{BridgeError, Result};

/// One delivery from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub body: String,
    /// How many times this message has been handed out, starting at 1.
    pub dequeue_count: u32,
}

/// The queue contract the bridge and the worker rely on.
///
/// Delivery is at-least-once and FIFO per producer; consumers must tolerate
/// seeing the same message more than once.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, body: String) -> Result<()>;

    /// Waits for the next message. `None` once the queue is closed and drained.
    async fn receive(&self) -> Result<Option<QueueMessage>>;
}

/// In-process FIFO queue.
pub struct MemoryQueue {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<QueueMessage>>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
    next_id: AtomicU64,
}

impl MemoryQueue {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            name: name.into(),
            tx: Mutex::new(Some(tx)),
            rx: tokio::sync::Mutex::new(rx),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stops accepting messages; receivers drain what is left, then see `None`.
    pub fn close(&self) {
        self.tx.lock().take();
    }

    /// Puts a message back for another delivery attempt.
    pub fn redeliver(&self, message: QueueMessage) -> Result<()> {
        self.push(QueueMessage {
            dequeue_count: message.dequeue_count + 1,
            ..message
        })
    }

    /// Non-blocking receive, mostly for assertions.
    pub fn try_receive(&self) -> Option<QueueMessage> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }

    fn push(&self, message: QueueMessage) -> Result<()> {
        let guard = self.tx.lock();
        let tx = guard
            .as_ref()
            .ok_or_else(|| BridgeError::Queue(format!("queue '{}' is closed", self.name)))?;
        tx.send(message)
            .map_err(|_| BridgeError::Queue(format!("queue '{}' is closed", self.name)))
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String) -> Result<()> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.push(QueueMessage {
            id: format!("{}-{}", self.name, id),
            body,
            dequeue_count: 1,
        })
    }

    async fn receive(&self) -> Result<Option<QueueMessage>> {
        Ok(self.rx.lock().await.recv().await)
    }
}
