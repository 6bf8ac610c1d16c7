use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::QueueBinding;
use crate::poller::PollPolicy;

const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful support agent. Answer the user's questions to the best of your ability.";

/// Process-wide settings, read once at startup and shared by every request.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub project_endpoint: String,
    pub project_api_key: String,
    pub queue_service_uri: String,
    pub input_queue: String,
    pub output_queue: String,
    pub model: String,
    pub agent_name: String,
    pub instructions: String,
    pub code_interpreter: bool,
    pub poll: PollPolicy,
    pub run_timeout: Duration,
    pub invocation_timeout: Duration,
    pub gateway_addr: SocketAddr,
    pub function_key: Option<String>,
}

impl BridgeConfig {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("{key} must be set"))
        };
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let interval = Duration::from_millis(parse(&lookup, "POLL_INTERVAL_MS", 1000u64)?);
        let max_interval = Duration::from_millis(parse(&lookup, "POLL_MAX_INTERVAL_MS", 1000u64)?);
        let backoff = parse(&lookup, "POLL_BACKOFF", 1.0f64)?;
        anyhow::ensure!(!interval.is_zero(), "POLL_INTERVAL_MS must be positive");
        anyhow::ensure!(
            backoff.is_finite() && backoff >= 1.0,
            "POLL_BACKOFF must be a finite number of at least 1.0"
        );

        Ok(Self {
            project_endpoint: required("PROJECT_CONNECTION_STRING")?,
            project_api_key: required("PROJECT_API_KEY")?,
            queue_service_uri: required("STORAGE_CONNECTION__queueServiceUri")?,
            input_queue: or_default("INPUT_QUEUE_NAME", "input"),
            output_queue: or_default("OUTPUT_QUEUE_NAME", "output"),
            model: or_default("AGENT_MODEL", "gpt-4o-mini"),
            agent_name: or_default("AGENT_NAME", "azure-function-agent-get-weather"),
            instructions: or_default("AGENT_INSTRUCTIONS", DEFAULT_INSTRUCTIONS),
            code_interpreter: parse(&lookup, "AGENT_CODE_INTERPRETER", true)?,
            poll: PollPolicy {
                interval,
                max_interval,
                backoff,
            },
            run_timeout: Duration::from_secs(parse(&lookup, "RUN_TIMEOUT_SECS", 120u64)?),
            invocation_timeout: Duration::from_secs(parse(&lookup, "INVOCATION_TIMEOUT_SECS", 60u64)?),
            gateway_addr: parse(&lookup, "GATEWAY_ADDR", SocketAddr::from(([0, 0, 0, 0], 3000)))?,
            function_key: lookup("FUNCTION_KEY").filter(|k| !k.is_empty()),
        })
    }

    pub fn input_binding(&self) -> QueueBinding {
        QueueBinding {
            queue_service_uri: self.queue_service_uri.clone(),
            queue_name: self.input_queue.clone(),
        }
    }

    pub fn output_binding(&self) -> QueueBinding {
        QueueBinding {
            queue_service_uri: self.queue_service_uri.clone(),
            queue_name: self.output_queue.clone(),
        }
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: '{raw}'")),
        None => Ok(default),
    }
}
