use std::sync::Arc;
use std::time::Duration;

use qbridge_core::capability::Capability;
use qbridge_core::codec::{self, InvocationEnvelope, ResultEnvelope};
use qbridge_core::queue::{MessageQueue, QueueMessage};
use qbridge_core::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// Executes one capability for every invocation on the inbound queue and
/// publishes the answer on the outbound queue.
pub struct ToolWorker {
    capability: Arc<dyn Capability>,
    inbound: Arc<dyn MessageQueue>,
    outbound: Arc<dyn MessageQueue>,
    retry_delay: Duration,
}

impl ToolWorker {
    pub fn new(
        capability: Arc<dyn Capability>,
        inbound: Arc<dyn MessageQueue>,
        outbound: Arc<dyn MessageQueue>,
    ) -> Self {
        Self {
            capability,
            inbound,
            outbound,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Pause before receiving again after the inbound queue reports an error.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Processes a single delivery.
    ///
    /// Malformed messages are logged and dropped: `Ok(None)`, nothing sent.
    /// Otherwise exactly one result is published.
    pub async fn handle(&self, message: &QueueMessage) -> Result<Option<ResultEnvelope>> {
        let invocation: InvocationEnvelope = match codec::decode(&message.body) {
            Ok(invocation) => invocation,
            Err(e) => {
                warn!(
                    queue = self.inbound.name(),
                    message_id = %message.id,
                    "dropping invocation: {}", e
                );
                return Ok(None);
            }
        };
        info!(
            correlation_id = %invocation.correlation_id,
            dequeue_count = message.dequeue_count,
            "{} invoked for '{}'", self.capability.name(), invocation.location
        );

        let value = self.capability.invoke(&invocation)?;
        let result = ResultEnvelope::answering(&invocation, value);
        self.outbound.send(codec::encode(&result)?).await?;

        info!(
            correlation_id = %result.correlation_id,
            "Sent message to queue: {} with value '{}'", self.outbound.name(), result.value
        );
        Ok(Some(result))
    }

    /// Receives until cancelled or the inbound queue closes, handling
    /// messages concurrently. In-flight messages finish before returning.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            queue = self.inbound.name(),
            capability = self.capability.name(),
            "tool worker started"
        );
        let tracker = TaskTracker::new();

        loop {
            let received = tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.inbound.receive() => received,
            };
            match received {
                Ok(Some(message)) => {
                    let worker = Arc::clone(&self);
                    tracker.spawn(async move {
                        if let Err(e) = worker.handle(&message).await {
                            error!(message_id = %message.id, "invocation failed: {}", e);
                        }
                    });
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(queue = self.inbound.name(), "receive failed: {}", e);
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
            }
        }

        tracker.close();
        tracker.wait().await;
        info!(queue = self.inbound.name(), "tool worker stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(cancel))
    }
}
