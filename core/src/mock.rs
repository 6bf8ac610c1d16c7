//! Scripted agent engine for deterministic tests without a hosted service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::agent::{
    AgentDefinition, AgentHandle, AgentService, Message, MessageContent, Role, Run, RunError,
    RunStatus, ThreadHandle, ToolCall, ToolOutput,
};
use crate::error::{BridgeError, Result};

/// What every run started on the mock does once it leaves `queued`.
#[derive(Debug, Clone)]
pub enum MockScript {
    /// Ask for one tool call, then answer with the submitted output.
    CallTool { call_id: String, arguments: String },
    /// Answer directly with this text.
    Reply(String),
    Fail(RunError),
    Expire,
    Cancel,
    /// Stop short of an answer with `incomplete`.
    Incomplete,
    /// Complete without writing any assistant message.
    Silent,
}

struct MockRun {
    thread_id: String,
    agent_id: String,
    status: RunStatus,
    last_error: Option<RunError>,
    submitted: Option<Vec<ToolOutput>>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    agents: HashMap<String, AgentDefinition>,
    deleted_agents: Vec<String>,
    threads: HashMap<String, Vec<Message>>,
    runs: HashMap<String, MockRun>,
}

impl MockState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{}", self.next_id)
    }

    fn push_message(&mut self, thread_id: &str, role: Role, text: String) -> Result<Message> {
        let id = self.id("msg");
        let created_at = self.next_id as i64;
        let messages = self
            .threads
            .get_mut(thread_id)
            .ok_or_else(|| BridgeError::Agent(format!("thread '{thread_id}' not found")))?;
        let message = Message {
            id,
            role,
            content: vec![MessageContent::Text { text }],
            created_at,
        };
        messages.push(message.clone());
        Ok(message)
    }
}

pub struct MockAgentService {
    script: MockScript,
    state: Mutex<MockState>,
    polls: AtomicUsize,
    tool_name: Option<String>,
}

impl MockAgentService {
    pub fn new(script: MockScript) -> Self {
        Self {
            script,
            state: Mutex::new(MockState::default()),
            polls: AtomicUsize::new(0),
            tool_name: None,
        }
    }

    /// Names `name` in requested tool calls instead of the agent's own tool.
    pub fn with_tool_name(mut self, name: impl Into<String>) -> Self {
        self.tool_name = Some(name.into());
        self
    }

    /// Number of `get_run` calls so far.
    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn runs_created(&self) -> usize {
        self.state.lock().runs.len()
    }

    pub fn agents_created(&self) -> usize {
        self.state.lock().agents.len()
    }

    pub fn deleted_agents(&self) -> Vec<String> {
        self.state.lock().deleted_agents.clone()
    }

    pub fn agent_definition(&self, agent_id: &str) -> Option<AgentDefinition> {
        self.state.lock().agents.get(agent_id).cloned()
    }

    /// Messages on `thread_id`, oldest first.
    pub fn messages(&self, thread_id: &str) -> Vec<Message> {
        self.state.lock().threads.get(thread_id).cloned().unwrap_or_default()
    }

    /// Outputs submitted for `run_id`, if any.
    pub fn submitted_outputs(&self, run_id: &str) -> Option<Vec<ToolOutput>> {
        self.state.lock().runs.get(run_id)?.submitted.clone()
    }

    /// Creates an agent and a thread with one user message.
    pub async fn seed(&self) -> (ThreadHandle, AgentHandle) {
        let mut state = self.state.lock();
        let agent = state.id("asst");
        state.agents.insert(agent.clone(), placeholder_definition());
        let thread = state.id("thread");
        state.threads.insert(thread.clone(), Vec::new());
        let _ = state.push_message(&thread, Role::User, "hello".into());
        (ThreadHandle { id: thread }, AgentHandle { id: agent })
    }

    fn advance(&self, state: &mut MockState, run_id: &str) -> Result<()> {
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| BridgeError::Agent(format!("run '{run_id}' not found")))?;

        match run.status {
            RunStatus::Queued => run.status = RunStatus::InProgress,
            RunStatus::InProgress => {
                let thread_id = run.thread_id.clone();
                let reply = match &self.script {
                    MockScript::CallTool { .. } => match &run.submitted {
                        None => {
                            run.status = RunStatus::RequiresAction;
                            None
                        }
                        Some(outputs) => {
                            run.status = RunStatus::Completed;
                            let joined: Vec<&str> =
                                outputs.iter().map(|o| o.output.as_str()).collect();
                            Some(format!("Here is what I found: {}", joined.join(" ")))
                        }
                    },
                    MockScript::Reply(text) => {
                        run.status = RunStatus::Completed;
                        Some(text.clone())
                    }
                    MockScript::Fail(error) => {
                        run.status = RunStatus::Failed;
                        run.last_error = Some(error.clone());
                        None
                    }
                    MockScript::Expire => {
                        run.status = RunStatus::Expired;
                        None
                    }
                    MockScript::Cancel => {
                        run.status = RunStatus::Cancelled;
                        None
                    }
                    MockScript::Incomplete => {
                        run.status = RunStatus::Incomplete;
                        None
                    }
                    MockScript::Silent => {
                        run.status = RunStatus::Completed;
                        None
                    }
                };
                if let Some(text) = reply {
                    state.push_message(&thread_id, Role::Assistant, text)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn snapshot(&self, state: &MockState, run_id: &str) -> Result<Run> {
        let run = state
            .runs
            .get(run_id)
            .ok_or_else(|| BridgeError::Agent(format!("run '{run_id}' not found")))?;

        let tool_calls = match (&self.script, run.status) {
            (MockScript::CallTool { call_id, arguments }, RunStatus::RequiresAction) => {
                let name = match &self.tool_name {
                    Some(name) => name.clone(),
                    None => state
                        .agents
                        .get(&run.agent_id)
                        .map(|d| d.tool.name.clone())
                        .unwrap_or_default(),
                };
                vec![ToolCall {
                    id: call_id.clone(),
                    name,
                    arguments: arguments.clone(),
                }]
            }
            _ => Vec::new(),
        };

        Ok(Run {
            id: run_id.to_string(),
            thread_id: run.thread_id.clone(),
            status: run.status,
            last_error: run.last_error.clone(),
            tool_calls,
        })
    }
}

fn placeholder_definition() -> AgentDefinition {
    use crate::agent::{QueueBinding, ToolDescriptor};

    let binding = |name: &str| QueueBinding {
        queue_service_uri: "memory://".into(),
        queue_name: name.into(),
    };
    AgentDefinition {
        name: "mock".into(),
        model: "mock".into(),
        instructions: String::new(),
        tool: ToolDescriptor {
            name: "GetWeather".into(),
            description: String::new(),
            parameters: serde_json::json!({"type": "object"}),
            input_binding: binding("input"),
            output_binding: binding("output"),
        },
        code_interpreter: false,
    }
}

#[async_trait]
impl AgentService for MockAgentService {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentHandle> {
        let mut state = self.state.lock();
        let id = state.id("asst");
        state.agents.insert(id.clone(), definition.clone());
        Ok(AgentHandle { id })
    }

    async fn delete_agent(&self, agent: &AgentHandle) -> Result<()> {
        let mut state = self.state.lock();
        if !state.agents.contains_key(&agent.id) {
            return Err(BridgeError::Agent(format!("agent '{}' not found", agent.id)));
        }
        state.deleted_agents.push(agent.id.clone());
        Ok(())
    }

    async fn create_thread(&self) -> Result<ThreadHandle> {
        let mut state = self.state.lock();
        let id = state.id("thread");
        state.threads.insert(id.clone(), Vec::new());
        Ok(ThreadHandle { id })
    }

    async fn add_message(&self, thread: &ThreadHandle, role: Role, text: &str) -> Result<Message> {
        self.state.lock().push_message(&thread.id, role, text.to_string())
    }

    async fn create_run(&self, thread: &ThreadHandle, agent: &AgentHandle) -> Result<Run> {
        let mut state = self.state.lock();
        if !state.threads.contains_key(&thread.id) {
            return Err(BridgeError::Agent(format!("thread '{}' not found", thread.id)));
        }
        let id = state.id("run");
        state.runs.insert(
            id.clone(),
            MockRun {
                thread_id: thread.id.clone(),
                agent_id: agent.id.clone(),
                status: RunStatus::Queued,
                last_error: None,
                submitted: None,
            },
        );
        self.snapshot(&state, &id)
    }

    async fn get_run(&self, _thread_id: &str, run_id: &str) -> Result<Run> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();
        self.advance(&mut state, run_id)?;
        self.snapshot(&state, run_id)
    }

    async fn submit_tool_outputs(
        &self,
        _thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run> {
        let mut state = self.state.lock();
        let run = state
            .runs
            .get_mut(run_id)
            .ok_or_else(|| BridgeError::Agent(format!("run '{run_id}' not found")))?;
        if run.status != RunStatus::RequiresAction {
            return Err(BridgeError::Agent(format!(
                "run '{run_id}' is {} and does not accept tool outputs",
                run.status
            )));
        }
        run.submitted = Some(outputs);
        run.status = RunStatus::InProgress;
        self.snapshot(&state, run_id)
    }

    async fn list_messages(&self, thread: &ThreadHandle) -> Result<Vec<Message>> {
        self.state
            .lock()
            .threads
            .get(&thread.id)
            .cloned()
            .ok_or_else(|| BridgeError::Agent(format!("thread '{}' not found", thread.id)))
    }
}
