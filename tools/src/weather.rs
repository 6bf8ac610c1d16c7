use qbridge_core::capability::Capability;
use qbridge_core::codec::InvocationEnvelope;
use qbridge_core::Result;
use serde_json::{json, Value};

/// Mock weather lookup: same answer for every place.
pub struct GetWeather;

impl Capability for GetWeather {
    fn name(&self) -> &str {
        "GetWeather"
    }

    fn description(&self) -> &str {
        "Get the weather in a location."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "The location to look up."}
            },
            "required": ["location"]
        })
    }

    fn invoke(&self, invocation: &InvocationEnvelope) -> Result<String> {
        Ok(format!("Weather is 74 degrees and sunny in {}", invocation.location))
    }
}
