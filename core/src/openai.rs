use async_openai::{
    config::OpenAIConfig,
    types::{
        AssistantTools, AssistantToolsFunction, CreateAssistantRequestArgs,
        CreateMessageRequestArgs, CreateRunRequestArgs, CreateThreadRequestArgs,
        FunctionObjectArgs, MessageContent as OpenAiContent, MessageObject, MessageRole,
        RunObject, RunStatus as OpenAiRunStatus, SubmitToolOutputsRunRequest, ToolsOutputs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::info;

use crate::agent::{
    AgentDefinition, AgentHandle, AgentService, Message, MessageContent, Role, Run, RunError,
    RunStatus, ThreadHandle, ToolCall, ToolOutput,
};
use crate::config::BridgeConfig;
use crate::error::Result;

/// Agent service backed by an OpenAI-compatible assistants endpoint.
///
/// The hosted engine only sees the function part of the tool descriptor;
/// the queue bindings are honoured on this side by the bridge, which turns
/// every `requires_action` into a queue round-trip.
pub struct OpenAiAgentService {
    client: Client<OpenAIConfig>,
}

impl OpenAiAgentService {
    pub fn new(config: &BridgeConfig) -> Self {
        let openai = OpenAIConfig::new()
            .with_api_base(&config.project_endpoint)
            .with_api_key(&config.project_api_key);
        let client = Client::with_config(openai);

        info!("Agent service client ready. Endpoint: {}", config.project_endpoint);
        Self { client }
    }
}

fn convert_status(status: &OpenAiRunStatus) -> RunStatus {
    match status {
        OpenAiRunStatus::Queued => RunStatus::Queued,
        OpenAiRunStatus::InProgress => RunStatus::InProgress,
        OpenAiRunStatus::RequiresAction => RunStatus::RequiresAction,
        OpenAiRunStatus::Cancelling => RunStatus::Cancelling,
        OpenAiRunStatus::Cancelled => RunStatus::Cancelled,
        OpenAiRunStatus::Failed => RunStatus::Failed,
        OpenAiRunStatus::Completed => RunStatus::Completed,
        OpenAiRunStatus::Incomplete => RunStatus::Incomplete,
        OpenAiRunStatus::Expired => RunStatus::Expired,
    }
}

fn convert_run(run: RunObject) -> Run {
    let last_error = run.last_error.map(|e| RunError {
        code: serde_json::to_value(&e.code)
            .ok()
            .and_then(|v| v.as_str().map(str::to_owned))
            .unwrap_or_else(|| format!("{:?}", e.code)),
        message: e.message,
    });

    let tool_calls = run
        .required_action
        .map(|action| {
            action
                .submit_tool_outputs
                .tool_calls
                .into_iter()
                .map(|call| ToolCall {
                    id: call.id,
                    name: call.function.name,
                    arguments: call.function.arguments,
                })
                .collect()
        })
        .unwrap_or_default();

    Run {
        status: convert_status(&run.status),
        id: run.id,
        thread_id: run.thread_id,
        last_error,
        tool_calls,
    }
}

fn convert_message(message: MessageObject) -> Message {
    let role = match message.role {
        MessageRole::User => Role::User,
        MessageRole::Assistant => Role::Assistant,
    };
    let content = message
        .content
        .into_iter()
        .map(|part| match part {
            OpenAiContent::Text(text) => MessageContent::Text {
                text: text.text.value,
            },
            _ => MessageContent::Other {
                description: "non-text content".to_string(),
            },
        })
        .collect();

    Message {
        id: message.id,
        role,
        content,
        created_at: i64::from(message.created_at),
    }
}

#[async_trait]
impl AgentService for OpenAiAgentService {
    async fn create_agent(&self, definition: &AgentDefinition) -> Result<AgentHandle> {
        let function = FunctionObjectArgs::default()
            .name(&definition.tool.name)
            .description(&definition.tool.description)
            .parameters(definition.tool.parameters.clone())
            .build()?;

        let mut tools = vec![AssistantTools::Function(AssistantToolsFunction { function })];
        if definition.code_interpreter {
            tools.push(AssistantTools::CodeInterpreter);
        }

        let request = CreateAssistantRequestArgs::default()
            .model(&definition.model)
            .name(&definition.name)
            .instructions(&definition.instructions)
            .tools(tools)
            .build()?;

        let assistant = self.client.assistants().create(request).await?;
        Ok(AgentHandle { id: assistant.id })
    }

    async fn delete_agent(&self, agent: &AgentHandle) -> Result<()> {
        self.client.assistants().delete(&agent.id).await?;
        Ok(())
    }

    async fn create_thread(&self) -> Result<ThreadHandle> {
        let request = CreateThreadRequestArgs::default().build()?;
        let thread = self.client.threads().create(request).await?;
        Ok(ThreadHandle { id: thread.id })
    }

    async fn add_message(&self, thread: &ThreadHandle, role: Role, text: &str) -> Result<Message> {
        let role = match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        };
        let request = CreateMessageRequestArgs::default()
            .role(role)
            .content(text.to_string())
            .build()?;

        let message = self
            .client
            .threads()
            .messages(&thread.id)
            .create(request)
            .await?;
        Ok(convert_message(message))
    }

    async fn create_run(&self, thread: &ThreadHandle, agent: &AgentHandle) -> Result<Run> {
        let request = CreateRunRequestArgs::default()
            .assistant_id(&agent.id)
            .build()?;
        let run = self.client.threads().runs(&thread.id).create(request).await?;
        Ok(convert_run(run))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run> {
        let run = self.client.threads().runs(thread_id).retrieve(run_id).await?;
        Ok(convert_run(run))
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<Run> {
        let request = SubmitToolOutputsRunRequest {
            tool_outputs: outputs
                .into_iter()
                .map(|o| ToolsOutputs {
                    tool_call_id: Some(o.tool_call_id),
                    output: Some(o.output),
                })
                .collect(),
            stream: None,
        };
        let run = self
            .client
            .threads()
            .runs(thread_id)
            .submit_tool_outputs(run_id, request)
            .await?;
        Ok(convert_run(run))
    }

    async fn list_messages(&self, thread: &ThreadHandle) -> Result<Vec<Message>> {
        let query = [("order", "asc"), ("limit", "100")];
        let response = self
            .client
            .threads()
            .messages(&thread.id)
            .list(&query)
            .await?;
        Ok(response.data.into_iter().map(convert_message).collect())
    }
}
