//! The agent-service contract: runs, threads, messages and the agent
//! definition the bridge registers. The reasoning engine behind it is an
//! external collaborator; see `openai` for the hosted adapter and `mock`
//! for the scripted one.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    InProgress,
    RequiresAction,
    Cancelling,
    Cancelled,
    Failed,
    Completed,
    Incomplete,
    Expired,
}

impl RunStatus {
    /// No further progress happens without starting a new run.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Expired | Self::Incomplete
        )
    }

    /// The poller hands control back on any of these.
    pub fn is_settled(self) -> bool {
        self.is_terminal() || self == Self::RequiresAction
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InProgress => "in_progress",
            Self::RequiresAction => "requires_action",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Completed => "completed",
            Self::Incomplete => "incomplete",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error detail attached to a failed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunError {
    pub code: String,
    pub message: String,
}

/// A function call the engine wants answered before the run can continue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded arguments, as produced by the model.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub output: String,
}

/// Snapshot of one agent execution on a thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub thread_id: String,
    pub status: RunStatus,
    pub last_error: Option<RunError>,
    /// Populated while `status` is `requires_action`.
    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    /// Anything that is not text (images, files, refusals).
    Other { description: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: Vec<MessageContent>,
    /// Seconds since the epoch; orders messages within a thread.
    pub created_at: i64,
}

impl Message {
    /// Text of the first content part, when that part is text.
    pub fn text(&self) -> Option<&str> {
        match self.content.first()? {
            MessageContent::Text { text } => Some(text),
            MessageContent::Other { .. } => None,
        }
    }
}

/// Where the engine publishes invocations or reads results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBinding {
    pub queue_service_uri: String,
    pub queue_name: String,
}

/// The single capability an agent may call, plus its queue bindings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments.
    pub parameters: Value,
    pub input_binding: QueueBinding,
    pub output_binding: QueueBinding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub name: String,
    pub model: String,
    pub instructions: String,
    pub tool: ToolDescriptor,
    pub code_interpreter: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadHandle {
    pub id: String,
}

/// Remote agent-hosting service.
#[async_trait]
pub trait AgentService: Send + Sync {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentHandle>;

    async fn delete_agent(&self, agent: &AgentHandle) -> Result<()>;

    async fn create_thread(&self) -> Result<ThreadHandle>;

    async fn add_message(&self, thread: &ThreadHandle, role: Role, text: &str) -> Result<Message>;

    async fn create_run(&self, thread: &ThreadHandle, agent: &AgentHandle) -> Result<Run>;

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run>;

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run>;

    /// All messages of the thread, oldest first.
    async fn list_messages(&self, thread: &ThreadHandle) -> Result<Vec<Message>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_statuses() {
        let settled: Vec<_> = [
            RunStatus::Queued,
            RunStatus::InProgress,
            RunStatus::RequiresAction,
            RunStatus::Cancelling,
            RunStatus::Cancelled,
            RunStatus::Failed,
            RunStatus::Completed,
            RunStatus::Incomplete,
            RunStatus::Expired,
        ]
        .into_iter()
        .filter(|s| s.is_settled())
        .collect();

        assert_eq!(
            settled,
            vec![
                RunStatus::RequiresAction,
                RunStatus::Cancelled,
                RunStatus::Failed,
                RunStatus::Completed,
                RunStatus::Incomplete,
                RunStatus::Expired,
            ]
        );
        assert!(!RunStatus::RequiresAction.is_terminal());
    }

    #[test]
    fn status_uses_wire_names() {
        assert_eq!(
            serde_json::to_string(&RunStatus::RequiresAction).unwrap(),
            "\"requires_action\""
        );
        assert_eq!(RunStatus::InProgress.to_string(), "in_progress");
    }

    #[test]
    fn message_text_only_reads_text_parts() {
        let mut msg = Message {
            id: "m1".into(),
            role: Role::Assistant,
            content: vec![MessageContent::Text { text: "hi".into() }],
            created_at: 0,
        };
        assert_eq!(msg.text(), Some("hi"));

        msg.content = vec![MessageContent::Other { description: "image_file".into() }];
        assert_eq!(msg.text(), None);
    }
}
