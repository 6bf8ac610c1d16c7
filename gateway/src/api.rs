use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use qbridge_core::BridgeError;
use serde::Deserialize;

// Input: What the caller sends us
#[derive(Debug, Deserialize)]
pub struct PromptRequest {
    #[serde(rename = "Prompt", default)]
    pub prompt: Option<String>,
}

// Output on failure: status code plus "<Kind>: <message>" as plain text
#[derive(Debug)]
pub struct ApiError(pub BridgeError);

impl From<BridgeError> for ApiError {
    fn from(err: BridgeError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            BridgeError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            BridgeError::RunFailed { .. } => StatusCode::BAD_GATEWAY,
            BridgeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), format!("{}: {}", self.0.kind(), self.0)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbridge_core::agent::RunStatus;
    use std::time::Duration;

    #[test]
    fn status_codes_follow_the_failure_kind() {
        let cases = [
            (BridgeError::InvalidRequest("empty".into()), StatusCode::BAD_REQUEST),
            (
                BridgeError::RunFailed {
                    status: RunStatus::Expired,
                    detail: "gone".into(),
                },
                StatusCode::BAD_GATEWAY,
            ),
            (BridgeError::NoResponse("none".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (BridgeError::Timeout(Duration::from_secs(1)), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }

    #[test]
    fn prompt_field_is_optional() {
        let req: PromptRequest = serde_json::from_str("{}").unwrap();
        assert!(req.prompt.is_none());
        let req: PromptRequest = serde_json::from_str(r#"{"Prompt":"hi"}"#).unwrap();
        assert_eq!(req.prompt.as_deref(), Some("hi"));
    }
}
