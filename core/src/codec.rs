//! Queue envelopes and their transport encoding.
//!
//! Envelopes travel as base64-wrapped JSON so the payload survives any
//! queue transport. The field names match what the agent engine emits
//! and expects: `location` / `Value` for the payload and `CorrelationId`
//! for the token that pairs a result with its invocation.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// A tool invocation published on the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationEnvelope {
    pub location: String,
    #[serde(rename = "CorrelationId")]
    pub correlation_id: String,
}

/// The answer to one invocation, published on the outbound queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    #[serde(rename = "Value")]
    pub value: String,
    #[serde(rename = "CorrelationId")]
    pub correlation_id: String,
}

impl ResultEnvelope {
    /// Builds the result for `invocation`, carrying its correlation id over.
    pub fn answering(invocation: &InvocationEnvelope, value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            correlation_id: invocation.correlation_id.clone(),
        }
    }
}

/// Serialises an envelope to base64-wrapped JSON.
pub fn encode<T: Serialize>(envelope: &T) -> Result<String> {
    let json = serde_json::to_vec(envelope)
        .map_err(|e| BridgeError::MalformedEnvelope(format!("cannot serialise: {e}")))?;
    Ok(STANDARD.encode(json))
}

/// Parses an envelope from base64-wrapped JSON.
///
/// Every failure, from bad base64 to a missing field, is `MalformedEnvelope`.
pub fn decode<T: DeserializeOwned>(body: &str) -> Result<T> {
    let bytes = STANDARD
        .decode(body.trim())
        .map_err(|e| BridgeError::MalformedEnvelope(format!("invalid base64: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| BridgeError::MalformedEnvelope(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wrap(value: serde_json::Value) -> String {
        STANDARD.encode(value.to_string())
    }

    #[test]
    fn invocation_round_trips() {
        let envelope = InvocationEnvelope {
            location: "Seattle".into(),
            correlation_id: "abc-1".into(),
        };
        let decoded: InvocationEnvelope = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn wire_names_match_the_queue_contract() {
        let result = ResultEnvelope {
            value: "Weather is 74 degrees and sunny in Seattle".into(),
            correlation_id: "abc-1".into(),
        };
        let bytes = STANDARD.decode(encode(&result).unwrap()).unwrap();
        let raw: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            raw,
            json!({"Value": "Weather is 74 degrees and sunny in Seattle", "CorrelationId": "abc-1"})
        );

        let invocation: InvocationEnvelope =
            decode(&wrap(json!({"location": "Oslo", "CorrelationId": "c-9"}))).unwrap();
        assert_eq!(invocation.location, "Oslo");
        assert_eq!(invocation.correlation_id, "c-9");
    }

    #[test]
    fn correlation_id_is_preserved_exactly() {
        let odd = "  call_Ünï/+=\u{0}  ";
        let envelope = ResultEnvelope {
            value: "v".into(),
            correlation_id: odd.into(),
        };
        let decoded: ResultEnvelope = decode(&encode(&envelope).unwrap()).unwrap();
        assert_eq!(decoded.correlation_id.as_bytes(), odd.as_bytes());
    }

    #[test]
    fn missing_location_is_malformed() {
        let err = decode::<InvocationEnvelope>(&wrap(json!({"CorrelationId": "abc-1"}))).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(msg) if msg.contains("location")));
    }

    #[test]
    fn mistyped_fields_are_malformed() {
        let err =
            decode::<ResultEnvelope>(&wrap(json!({"Value": 74, "CorrelationId": "abc-1"}))).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(_)));

        let err =
            decode::<InvocationEnvelope>(&wrap(json!({"location": "Oslo", "CorrelationId": 7}))).unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(_)));
    }

    #[test]
    fn non_base64_body_is_malformed() {
        let err = decode::<ResultEnvelope>("{not base64}").unwrap_err();
        assert!(matches!(err, BridgeError::MalformedEnvelope(msg) if msg.contains("base64")));
    }
}
