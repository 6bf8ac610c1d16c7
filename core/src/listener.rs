use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{self, ResultEnvelope};
use crate::pending::PendingInvocations;
use crate::queue::{MessageQueue, QueueMessage};

/// Consumes the outbound queue and hands each result to its pending waiter.
pub struct ResultListener {
    results: Arc<dyn MessageQueue>,
    pending: Arc<PendingInvocations>,
    purge_every: Duration,
}

impl ResultListener {
    pub fn new(results: Arc<dyn MessageQueue>, pending: Arc<PendingInvocations>) -> Self {
        let purge_every = pending
            .ttl()
            .clamp(Duration::from_millis(10), Duration::from_secs(5));
        Self {
            results,
            pending,
            purge_every,
        }
    }

    /// Decodes and routes one message. Returns whether a waiter was resolved.
    pub fn handle(&self, message: &QueueMessage) -> bool {
        let result: ResultEnvelope = match codec::decode(&message.body) {
            Ok(result) => result,
            Err(e) => {
                warn!(queue = self.results.name(), message_id = %message.id, "dropping result: {}", e);
                return false;
            }
        };

        let correlation_id = result.correlation_id.clone();
        match self.pending.resolve(result) {
            Ok(()) => {
                debug!(%correlation_id, "resolved pending invocation");
                true
            }
            Err(e) => {
                warn!(%correlation_id, dequeue_count = message.dequeue_count, "dropping result: {}", e);
                false
            }
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        info!(queue = self.results.name(), "result listener started");
        let mut purge = tokio::time::interval(self.purge_every);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = purge.tick() => {
                    let expired = self.pending.purge_expired();
                    if expired > 0 {
                        debug!(expired, "purged expired invocations");
                    }
                }
                received = self.results.receive() => match received {
                    Ok(Some(message)) => {
                        self.handle(&message);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        warn!(queue = self.results.name(), "receive failed: {}", e);
                        tokio::time::sleep(self.purge_every).await;
                    }
                },
            }
        }

        info!(queue = self.results.name(), "result listener stopped");
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }
}
