mod api;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use qbridge_core::bridge::{agent_definition, Bridge};
use qbridge_core::config::BridgeConfig;
use qbridge_core::listener::ResultListener;
use qbridge_core::openai::OpenAiAgentService;
use qbridge_core::pending::PendingInvocations;
use qbridge_core::poller::RunPoller;
use qbridge_core::queue::MemoryQueue;
use qbridge_tools::{GetWeather, ToolWorker};

use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Logging Setup
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    info!("qbridge gateway initializing...");

    // 2. Configuration, read once for the whole process
    let config = BridgeConfig::from_env().context("failed to load configuration")?;

    // 3. Queues shared by the bridge, the worker and the listener
    let inbound = Arc::new(MemoryQueue::new(config.input_queue.clone()));
    let outbound = Arc::new(MemoryQueue::new(config.output_queue.clone()));
    let pending = Arc::new(PendingInvocations::new(config.invocation_timeout));
    let shutdown = CancellationToken::new();

    // 4. Background tasks
    let capability = Arc::new(GetWeather);
    let worker = ToolWorker::new(capability.clone(), inbound.clone(), outbound.clone())
        .spawn(shutdown.child_token());
    let listener = ResultListener::new(outbound.clone(), pending.clone()).spawn(shutdown.child_token());
    info!(
        "Worker bound to '{}' -> '{}'",
        config.input_queue, config.output_queue
    );

    // 5. The Orchestrator
    let bridge = Bridge::new(
        Arc::new(OpenAiAgentService::new(&config)),
        agent_definition(&config, capability.as_ref()),
        RunPoller::new(config.poll.clone()),
        inbound.clone(),
        pending,
        config.run_timeout,
    );
    let state = AppState {
        bridge: Arc::new(bridge),
        function_key: config.function_key.as_deref().map(Arc::from),
    };
    if state.function_key.is_none() {
        info!("FUNCTION_KEY not set; /api/prompt is unauthenticated");
    }

    // 6. Start Server
    let listener_addr = config.gateway_addr;
    let tcp = TcpListener::bind(listener_addr)
        .await
        .with_context(|| format!("failed to bind {listener_addr}"))?;
    info!("Gateway listening on {}...", listener_addr);

    axum::serve(tcp, routes::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown requested");
        })
        .await
        .context("server error")?;

    // 7. Drain background tasks
    shutdown.cancel();
    inbound.close();
    outbound.close();
    drain([("tool worker", worker), ("result listener", listener)]).await;
    info!("Gateway stopped");
    Ok(())
}

/// Waits for every task and reports the ones that panicked or were aborted.
/// Returns how many ended abnormally.
async fn drain<const N: usize>(tasks: [(&str, JoinHandle<()>); N]) -> usize {
    let mut failed = 0;
    for (task, handle) in tasks {
        if let Err(e) = handle.await {
            error!("{} task ended abnormally: {}", task, e);
            failed += 1;
        }
    }
    failed
}
