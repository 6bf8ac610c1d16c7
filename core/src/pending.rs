//! Invocations published to the tool worker that still await a result.
//!
//! Every entry is keyed by correlation id and expires after a fixed TTL.
//! A result may resolve exactly one live entry; anything else is a
//! protocol violation.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::codec::ResultEnvelope;
use crate::error::{BridgeError, Result};

struct Entry {
    tx: oneshot::Sender<String>,
    deadline: Instant,
}

pub struct PendingInvocations {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Waits for the value of one registered invocation.
pub struct PendingResult {
    correlation_id: String,
    ttl: Duration,
    rx: oneshot::Receiver<String>,
}

impl PendingResult {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Resolves with the value, or `Timeout` once the entry expired.
    pub async fn wait(self) -> Result<String> {
        match tokio::time::timeout(self.ttl, self.rx).await {
            Ok(Ok(value)) => Ok(value),
            // Sender dropped: purged as expired.
            Ok(Err(_)) | Err(_) => Err(BridgeError::Timeout(self.ttl)),
        }
    }
}

impl PendingInvocations {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn register(&self, correlation_id: &str) -> Result<PendingResult> {
        let mut entries = self.entries.lock();
        let now = Instant::now();
        if let Some(existing) = entries.get(correlation_id) {
            if existing.deadline > now {
                return Err(BridgeError::ProtocolViolation(format!(
                    "correlation id '{correlation_id}' is already pending"
                )));
            }
        }

        let (tx, rx) = oneshot::channel();
        entries.insert(
            correlation_id.to_string(),
            Entry {
                tx,
                deadline: now + self.ttl,
            },
        );
        debug!(correlation_id, "registered pending invocation");

        Ok(PendingResult {
            correlation_id: correlation_id.to_string(),
            ttl: self.ttl,
            rx,
        })
    }

    /// Hands the result to its waiter and removes the entry.
    pub fn resolve(&self, result: ResultEnvelope) -> Result<()> {
        let entry = self
            .entries
            .lock()
            .remove(&result.correlation_id)
            .ok_or_else(|| {
                BridgeError::ProtocolViolation(format!(
                    "no pending invocation for correlation id '{}'",
                    result.correlation_id
                ))
            })?;

        if entry.deadline <= Instant::now() {
            return Err(BridgeError::ProtocolViolation(format!(
                "result for correlation id '{}' arrived after expiry",
                result.correlation_id
            )));
        }

        entry.tx.send(result.value).map_err(|_| {
            BridgeError::ProtocolViolation(format!(
                "waiter for correlation id '{}' is gone",
                result.correlation_id
            ))
        })
    }

    /// Forgets an entry without resolving it.
    pub fn cancel(&self, correlation_id: &str) -> bool {
        self.entries.lock().remove(correlation_id).is_some()
    }

    /// Drops every expired entry; returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|id, entry| {
            let live = entry.deadline > now;
            if !live {
                warn!(correlation_id = %id, "pending invocation expired");
            }
            live
        });
        before - entries.len()
    }
}
