use std::time::Duration;

use crate::agent::RunStatus;

/// Failure taxonomy of the bridge.
///
/// `InvalidRequest`, `MalformedEnvelope`, `RunFailed` and `NoResponse` are the
/// caller-visible kinds; the rest describe plumbing failures underneath them.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("run {status}: {detail}")]
    RunFailed { status: RunStatus, detail: String },

    #[error("no assistant response: {0}")]
    NoResponse(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("agent service error: {0}")]
    Agent(String),

    #[error("queue error: {0}")]
    Queue(String),
}

impl BridgeError {
    /// Stable name of the failure kind, used at the HTTP boundary.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "InvalidRequest",
            Self::MalformedEnvelope(_) => "MalformedEnvelope",
            Self::RunFailed { .. } => "RunFailed",
            Self::NoResponse(_) => "NoResponse",
            Self::Timeout(_) => "Timeout",
            Self::Cancelled => "Cancelled",
            Self::ProtocolViolation(_) => "ProtocolViolation",
            Self::Agent(_) => "AgentError",
            Self::Queue(_) => "QueueError",
        }
    }
}

impl From<async_openai::error::OpenAIError> for BridgeError {
    fn from(err: async_openai::error::OpenAIError) -> Self {
        Self::Agent(err.to_string())
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_failed_keeps_detail_verbatim() {
        let err = BridgeError::RunFailed {
            status: RunStatus::Failed,
            detail: "rate_limit_exceeded: slow down".into(),
        };
        assert_eq!(err.kind(), "RunFailed");
        assert_eq!(err.to_string(), "run failed: rate_limit_exceeded: slow down");
    }
}
