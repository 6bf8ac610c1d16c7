//! The orchestrator: prompt in, answer out, with tool calls delegated to the
//! worker over the inbound/outbound queue pair.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::{
    AgentDefinition, AgentHandle, AgentService, Role, RunStatus, ThreadHandle, ToolCall,
    ToolDescriptor, ToolOutput,
};
use crate::capability::Capability;
use crate::codec::{self, InvocationEnvelope};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::pending::{PendingInvocations, PendingResult};
use crate::poller::RunPoller;
use crate::queue::MessageQueue;

/// Arguments the model supplies for the bridged capability.
#[derive(Debug, Deserialize)]
struct ToolArguments {
    location: String,
}

/// Builds the agent definition for `capability` from process config.
pub fn agent_definition(config: &BridgeConfig, capability: &dyn Capability) -> AgentDefinition {
    AgentDefinition {
        name: config.agent_name.clone(),
        model: config.model.clone(),
        instructions: config.instructions.clone(),
        tool: ToolDescriptor::for_capability(
            capability,
            config.input_binding(),
            config.output_binding(),
        ),
        code_interpreter: config.code_interpreter,
    }
}

pub struct Bridge {
    service: Arc<dyn AgentService>,
    definition: AgentDefinition,
    poller: RunPoller,
    invocations: Arc<dyn MessageQueue>,
    pending: Arc<PendingInvocations>,
    run_timeout: Duration,
}

impl Bridge {
    pub fn new(
        service: Arc<dyn AgentService>,
        definition: AgentDefinition,
        poller: RunPoller,
        invocations: Arc<dyn MessageQueue>,
        pending: Arc<PendingInvocations>,
        run_timeout: Duration,
    ) -> Self {
        Self {
            service,
            definition,
            poller,
            invocations,
            pending,
            run_timeout,
        }
    }

    pub fn definition(&self) -> &AgentDefinition {
        &self.definition
    }

    pub async fn handle_prompt(&self, prompt: &str) -> Result<String> {
        self.handle_prompt_with_cancel(prompt, &CancellationToken::new())
            .await
    }

    /// Runs one prompt to completion and returns the assistant's answer.
    ///
    /// The agent is created for this prompt and deleted afterwards, whatever
    /// the outcome.
    pub async fn handle_prompt_with_cancel(
        &self,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(BridgeError::InvalidRequest("prompt must not be empty".into()));
        }

        let agent = self.service.create_agent(&self.definition).await?;
        info!(agent_id = %agent.id, "created agent");

        let outcome =
            match tokio::time::timeout(self.run_timeout, self.converse(&agent, prompt, cancel)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(BridgeError::Timeout(self.run_timeout)),
            };

        match self.service.delete_agent(&agent).await {
            Ok(()) => info!(agent_id = %agent.id, "deleted agent"),
            Err(e) => warn!(agent_id = %agent.id, "failed to delete agent: {}", e),
        }

        outcome
    }

    async fn converse(
        &self,
        agent: &AgentHandle,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let thread = self.service.create_thread().await?;
        info!(thread_id = %thread.id, "created thread");

        let message = self.service.add_message(&thread, Role::User, prompt).await?;
        info!(message_id = %message.id, "created message");

        let mut run = self.service.create_run(&thread, agent).await?;
        loop {
            run = self.poller.wait(self.service.as_ref(), run, cancel).await?;
            match run.status {
                RunStatus::RequiresAction => {
                    let outputs = self.dispatch(&run.tool_calls).await?;
                    run = self
                        .service
                        .submit_tool_outputs(&run.thread_id, &run.id, outputs)
                        .await?;
                }
                RunStatus::Completed => break,
                status => {
                    let detail = run
                        .last_error
                        .map(|e| e.message)
                        .unwrap_or_else(|| format!("run ended with status {status}"));
                    error!(run_id = %run.id, %status, "Run failed: {}", detail);
                    return Err(BridgeError::RunFailed { status, detail });
                }
            }
        }
        info!(run_id = %run.id, "Run finished with status: completed");

        self.latest_answer(&thread).await
    }

    /// Publishes every call, then collects the results in call order.
    async fn dispatch(&self, calls: &[ToolCall]) -> Result<Vec<ToolOutput>> {
        if calls.is_empty() {
            return Err(BridgeError::ProtocolViolation(
                "run requires action but names no tool calls".into(),
            ));
        }

        let mut slots = Vec::with_capacity(calls.len());
        for call in calls {
            match self.publish(call).await {
                Ok(pending) => slots.push((call.id.clone(), Ok(pending))),
                Err(e @ (BridgeError::InvalidRequest(_) | BridgeError::MalformedEnvelope(_))) => {
                    warn!(correlation_id = %call.id, tool = %call.name, "answering call with error: {}", e);
                    slots.push((call.id.clone(), Err(format!("error: {e}"))));
                }
                Err(e) => return Err(e),
            }
        }

        let mut outputs = Vec::with_capacity(slots.len());
        for (tool_call_id, slot) in slots {
            let output = match slot {
                Ok(pending) => pending.wait().await?,
                Err(message) => message,
            };
            outputs.push(ToolOutput {
                tool_call_id,
                output,
            });
        }
        Ok(outputs)
    }

    async fn publish(&self, call: &ToolCall) -> Result<PendingResult> {
        if call.name != self.definition.tool.name {
            return Err(BridgeError::InvalidRequest(format!("unknown tool '{}'", call.name)));
        }
        let arguments: ToolArguments = serde_json::from_str(&call.arguments)
            .map_err(|e| BridgeError::MalformedEnvelope(format!("tool arguments: {e}")))?;

        let body = codec::encode(&InvocationEnvelope {
            location: arguments.location,
            correlation_id: call.id.clone(),
        })?;

        // Must be pending before the invocation is visible to the worker.
        let pending = self.pending.register(&call.id)?;
        if let Err(e) = self.invocations.send(body).await {
            self.pending.cancel(&call.id);
            return Err(e);
        }
        info!(correlation_id = %call.id, queue = self.invocations.name(), "published invocation");
        Ok(pending)
    }

    async fn latest_answer(&self, thread: &ThreadHandle) -> Result<String> {
        let messages = self.service.list_messages(thread).await?;
        let last = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .ok_or_else(|| {
                BridgeError::NoResponse(format!(
                    "no assistant message among {} thread messages",
                    messages.len()
                ))
            })?;

        let text = last.text().ok_or_else(|| {
            BridgeError::NoResponse(format!("message '{}' carries no text content", last.id))
        })?;
        info!(message_id = %last.id, "Last Agent Text Message: {}", text);
        Ok(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{QueueBinding, RunError};
    use crate::codec::ResultEnvelope;
    use crate::listener::ResultListener;
    use crate::mock::{MockAgentService, MockScript};
    use crate::poller::PollPolicy;
    use crate::queue::MemoryQueue;
    use serde_json::json;

    struct Harness {
        service: Arc<MockAgentService>,
        inbound: Arc<MemoryQueue>,
        outbound: Arc<MemoryQueue>,
        pending: Arc<PendingInvocations>,
        bridge: Bridge,
    }

    fn harness(script: MockScript, ttl: Duration) -> Harness {
        harness_with(MockAgentService::new(script), ttl)
    }

    fn harness_with(service: MockAgentService, ttl: Duration) -> Harness {
        let service = Arc::new(service);
        let inbound = Arc::new(MemoryQueue::new("input"));
        let outbound = Arc::new(MemoryQueue::new("output"));
        let pending = Arc::new(PendingInvocations::new(ttl));
        let binding = |name: &str| QueueBinding {
            queue_service_uri: "memory://".into(),
            queue_name: name.into(),
        };
        let definition = AgentDefinition {
            name: "weather-agent".into(),
            model: "gpt-4o-mini".into(),
            instructions: "be helpful".into(),
            tool: ToolDescriptor {
                name: "GetWeather".into(),
                description: "Get the weather in a location.".into(),
                parameters: json!({"type": "object", "required": ["location"]}),
                input_binding: binding("input"),
                output_binding: binding("output"),
            },
            code_interpreter: true,
        };
        let bridge = Bridge::new(
            service.clone(),
            definition,
            RunPoller::new(PollPolicy::fixed(Duration::from_millis(1))),
            inbound.clone(),
            pending.clone(),
            Duration::from_secs(5),
        );
        Harness {
            service,
            inbound,
            outbound,
            pending,
            bridge,
        }
    }

    /// Answers every invocation the way the weather worker would.
    fn spawn_worker(h: &Harness) {
        let inbound = h.inbound.clone();
        let outbound = h.outbound.clone();
        tokio::spawn(async move {
            while let Ok(Some(msg)) = inbound.receive().await {
                let invocation: InvocationEnvelope = codec::decode(&msg.body).unwrap();
                let result = ResultEnvelope::answering(
                    &invocation,
                    format!("Weather is 74 degrees and sunny in {}", invocation.location),
                );
                outbound.send(codec::encode(&result).unwrap()).await.unwrap();
            }
        });
        ResultListener::new(h.outbound.clone(), h.pending.clone()).spawn(CancellationToken::new());
    }

    #[tokio::test]
    async fn empty_prompt_creates_nothing() {
        let h = harness(MockScript::Reply("hi".into()), Duration::from_secs(1));
        let err = h.bridge.handle_prompt("   ").await.unwrap_err();
        assert!(matches!(err, BridgeError::InvalidRequest(_)));
        assert_eq!(h.service.agents_created(), 0);
        assert_eq!(h.service.runs_created(), 0);
    }

    #[tokio::test]
    async fn prompt_is_posted_verbatim() {
        let h = harness(MockScript::Reply("Hello there".into()), Duration::from_secs(1));
        h.bridge.handle_prompt("  hi\n").await.unwrap();

        // asst_1, thread_2, msg_3
        let messages = h.service.messages("thread_2");
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text(), Some("  hi\n"));
    }

    #[tokio::test]
    async fn direct_reply_is_returned_and_agent_released() {
        let h = harness(MockScript::Reply("Hello there".into()), Duration::from_secs(1));
        let answer = h.bridge.handle_prompt("hi").await.unwrap();
        assert_eq!(answer, "Hello there");
        assert_eq!(h.service.deleted_agents().len(), 1);
        assert!(h.inbound.try_receive().is_none());
    }

    #[tokio::test]
    async fn tool_call_round_trips_through_the_queues() {
        let h = harness(
            MockScript::CallTool {
                call_id: "abc-1".into(),
                arguments: r#"{"location":"Seattle"}"#.into(),
            },
            Duration::from_secs(5),
        );
        spawn_worker(&h);

        let answer = h.bridge.handle_prompt("What is the weather in Seattle?").await.unwrap();
        assert!(answer.contains("Seattle"));
        assert!(answer.contains("74 degrees"));
        assert!(h.pending.is_empty());

        let deleted = h.service.deleted_agents();
        let definition = h.service.agent_definition(&deleted[0]).unwrap();
        assert_eq!(definition.tool.name, "GetWeather");
    }

    #[tokio::test]
    async fn failed_run_surfaces_detail_unmodified() {
        let detail = "Rate limit reached for gpt-4o-mini: retry in 20s";
        let h = harness(
            MockScript::Fail(RunError {
                code: "rate_limit_exceeded".into(),
                message: detail.into(),
            }),
            Duration::from_secs(1),
        );

        match h.bridge.handle_prompt("hi").await.unwrap_err() {
            BridgeError::RunFailed { status, detail: got } => {
                assert_eq!(status, RunStatus::Failed);
                assert_eq!(got, detail);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.service.deleted_agents().len(), 1);
    }

    #[tokio::test]
    async fn expired_and_cancelled_runs_fail() {
        for (script, expected) in [
            (MockScript::Expire, RunStatus::Expired),
            (MockScript::Cancel, RunStatus::Cancelled),
        ] {
            let h = harness(script, Duration::from_secs(1));
            let err = h.bridge.handle_prompt("hi").await.unwrap_err();
            assert!(matches!(err, BridgeError::RunFailed { status, .. } if status == expected));
        }
    }

    #[tokio::test]
    async fn incomplete_run_fails() {
        let h = harness(MockScript::Incomplete, Duration::from_secs(1));
        match h.bridge.handle_prompt("hi").await.unwrap_err() {
            BridgeError::RunFailed { status, detail } => {
                assert_eq!(status, RunStatus::Incomplete);
                assert!(detail.contains("incomplete"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.service.deleted_agents().len(), 1);
    }

    #[tokio::test]
    async fn completed_run_without_answer_is_no_response() {
        let h = harness(MockScript::Silent, Duration::from_secs(1));
        let err = h.bridge.handle_prompt("hi").await.unwrap_err();
        assert!(matches!(err, BridgeError::NoResponse(_)));
    }

    #[tokio::test]
    async fn bad_tool_arguments_are_answered_with_an_error() {
        let h = harness(
            MockScript::CallTool {
                call_id: "abc-2".into(),
                arguments: r#"{"city":"Seattle"}"#.into(),
            },
            Duration::from_secs(1),
        );

        let answer = h.bridge.handle_prompt("weather?").await.unwrap();
        assert!(answer.contains("error:"));
        assert!(h.inbound.try_receive().is_none());
        assert!(h.pending.is_empty());
    }

    #[tokio::test]
    async fn unknown_tool_is_answered_with_an_error() {
        let service = MockAgentService::new(MockScript::CallTool {
            call_id: "abc-4".into(),
            arguments: r#"{"location":"Seattle"}"#.into(),
        })
        .with_tool_name("GetTime");
        let h = harness_with(service, Duration::from_secs(1));

        let answer = h.bridge.handle_prompt("what time is it?").await.unwrap();
        assert!(answer.contains("error:"));
        assert!(answer.contains("unknown tool 'GetTime'"));
        assert!(h.inbound.try_receive().is_none());
        assert!(h.pending.is_empty());

        // asst_1, thread_2, msg_3, run_4
        let outputs = h.service.submitted_outputs("run_4").unwrap();
        assert_eq!(outputs[0].tool_call_id, "abc-4");
        assert!(outputs[0].output.starts_with("error:"));
    }

    #[tokio::test]
    async fn missing_result_times_out_and_still_releases_agent() {
        let h = harness(
            MockScript::CallTool {
                call_id: "abc-3".into(),
                arguments: r#"{"location":"Seattle"}"#.into(),
            },
            Duration::from_millis(20),
        );

        let err = h.bridge.handle_prompt("weather?").await.unwrap_err();
        assert!(matches!(err, BridgeError::Timeout(_)));
        assert!(h.inbound.try_receive().is_some());
        assert_eq!(h.service.deleted_agents().len(), 1);
    }
}
