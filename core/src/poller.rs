use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::agent::{AgentService, Run};
use crate::error::{BridgeError, Result};

/// Delay policy between status checks.
#[derive(Clone, Debug)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each check. `1.0` keeps it fixed.
    pub backoff: f64,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(1),
            backoff: 1.0,
        }
    }
}

impl PollPolicy {
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
        }
    }

    fn next_delay(&self, current: Duration) -> Duration {
        let cap = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff.max(1.0))
            .unwrap_or(cap)
            .min(cap)
    }
}

/// Drives a run until it settles: terminal, or waiting on a tool call.
#[derive(Clone, Debug, Default)]
pub struct RunPoller {
    policy: PollPolicy,
}

impl RunPoller {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Returns the first observed snapshot whose status is settled.
    ///
    /// `run` is the snapshot the caller already holds; if it is settled it is
    /// returned without another fetch.
    pub async fn wait(
        &self,
        service: &dyn AgentService,
        run: Run,
        cancel: &CancellationToken,
    ) -> Result<Run> {
        let mut run = run;
        let mut delay = self.policy.interval;
        let mut polls = 0u32;

        while !run.status.is_settled() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(BridgeError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
            run = service.get_run(&run.thread_id, &run.id).await?;
            polls += 1;
            debug!(run_id = %run.id, status = %run.status, polls, "polled run status");
            delay = self.policy.next_delay(delay);
        }

        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{RunError, RunStatus};
    use crate::mock::{MockAgentService, MockScript};

    fn run(status: RunStatus) -> Run {
        Run {
            id: "run_1".into(),
            thread_id: "thread_1".into(),
            status,
            last_error: None,
            tool_calls: Vec::new(),
        }
    }

    #[test]
    fn backoff_is_capped() {
        let policy = PollPolicy {
            interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(250),
            backoff: 2.0,
        };
        assert_eq!(policy.next_delay(Duration::from_millis(100)), Duration::from_millis(200));
        assert_eq!(policy.next_delay(Duration::from_millis(200)), Duration::from_millis(250));
        assert_eq!(
            PollPolicy::default().next_delay(Duration::from_secs(1)),
            Duration::from_secs(1)
        );
    }

    #[test]
    fn huge_backoff_saturates_at_the_cap() {
        for backoff in [1e20, f64::INFINITY, f64::NAN] {
            let policy = PollPolicy {
                interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(5),
                backoff,
            };
            assert_eq!(policy.next_delay(Duration::from_millis(1)), Duration::from_millis(5));
        }
    }

    #[tokio::test]
    async fn infinite_backoff_still_polls_to_completion() {
        let service = MockAgentService::new(MockScript::Reply("done".into()));
        let (thread, agent) = service.seed().await;
        let started = service.create_run(&thread, &agent).await.unwrap();

        let poller = RunPoller::new(PollPolicy {
            interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(2),
            backoff: f64::INFINITY,
        });
        let out = poller
            .wait(&service, started, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn settled_snapshot_is_returned_without_polling() {
        let service = MockAgentService::new(MockScript::Reply("unused".into()));
        let poller = RunPoller::new(PollPolicy::fixed(Duration::from_millis(1)));

        let out = poller
            .wait(&service, run(RunStatus::Completed), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.status, RunStatus::Completed);
        assert_eq!(service.polls(), 0);
    }

    #[tokio::test]
    async fn stops_at_first_settled_status() {
        let service = MockAgentService::new(MockScript::CallTool {
            call_id: "abc-1".into(),
            arguments: r#"{"location":"Seattle"}"#.into(),
        });
        let (thread, agent) = service.seed().await;
        let started = service.create_run(&thread, &agent).await.unwrap();
        assert_eq!(started.status, RunStatus::Queued);

        let poller = RunPoller::new(PollPolicy::fixed(Duration::from_millis(1)));
        let out = poller
            .wait(&service, started, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(out.status, RunStatus::RequiresAction);
        assert_eq!(out.tool_calls[0].id, "abc-1");
        // queued -> in_progress -> requires_action
        assert_eq!(service.polls(), 2);
    }

    #[tokio::test]
    async fn failure_detail_is_carried() {
        let service = MockAgentService::new(MockScript::Fail(RunError {
            code: "server_error".into(),
            message: "engine exploded".into(),
        }));
        let (thread, agent) = service.seed().await;
        let started = service.create_run(&thread, &agent).await.unwrap();

        let poller = RunPoller::new(PollPolicy::fixed(Duration::from_millis(1)));
        let out = poller
            .wait(&service, started, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out.status, RunStatus::Failed);
        assert_eq!(out.last_error.unwrap().message, "engine exploded");
    }

    #[tokio::test]
    async fn cancellation_interrupts_the_wait() {
        let service = MockAgentService::new(MockScript::Reply("never".into()));
        let poller = RunPoller::new(PollPolicy::fixed(Duration::from_secs(60)));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = poller
            .wait(&service, run(RunStatus::Queued), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::Cancelled));
    }
}
