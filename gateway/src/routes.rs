use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use qbridge_core::{Bridge, BridgeError};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::api::{ApiError, PromptRequest};

const FUNCTION_KEY_HEADER: &str = "x-functions-key";

#[derive(Clone)]
pub struct AppState {
    pub bridge: Arc<Bridge>,
    pub function_key: Option<Arc<str>>,
}

pub fn router(state: AppState) -> Router {
    let prompt = post(handle_prompt).layer(middleware::from_fn_with_state(
        state.clone(),
        require_function_key,
    ));

    Router::new()
        .route("/health", get(health_check))
        .route("/api/prompt", prompt)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- HANDLERS ---

async fn health_check() -> &'static str {
    "qbridge gateway: operational"
}

async fn handle_prompt(
    State(state): State<AppState>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    info!("HTTP prompt request received");

    let Json(payload) = payload.map_err(|rejection| {
        warn!(status = %rejection.status(), "rejected prompt body: {}", rejection.body_text());
        BridgeError::InvalidRequest(rejection.body_text())
    })?;

    let prompt = payload
        .prompt
        .ok_or_else(|| BridgeError::InvalidRequest("missing 'Prompt' field".into()))?;

    match state.bridge.handle_prompt(&prompt).await {
        Ok(answer) => Ok(answer),
        Err(e) => {
            warn!(kind = e.kind(), "prompt failed: {}", e);
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct KeyQuery {
    code: Option<String>,
}

/// Function-level auth: the configured key in a header or `?code=`.
async fn require_function_key(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.function_key.as_deref() else {
        return next.run(request).await;
    };

    let presented = request
        .headers()
        .get(FUNCTION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or(query.code);

    if presented.as_deref() == Some(expected) {
        next.run(request).await
    } else {
        warn!("rejected request without a valid function key");
        (StatusCode::UNAUTHORIZED, "missing or invalid function key").into_response()
    }
}
