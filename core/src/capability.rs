use serde_json::Value;

use crate::agent::{QueueBinding, ToolDescriptor};
use crate::codec::InvocationEnvelope;
use crate::error::Result;

/// A named function an agent can delegate to the tool worker.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON schema of the arguments the model must supply.
    fn parameters(&self) -> Value;

    /// Must be a pure function of the invocation: duplicates are expected.
    fn invoke(&self, invocation: &InvocationEnvelope) -> Result<String>;
}

impl ToolDescriptor {
    /// Descriptor for `capability`, publishing on `input` and reading `output`.
    pub fn for_capability(
        capability: &dyn Capability,
        input: QueueBinding,
        output: QueueBinding,
    ) -> Self {
        Self {
            name: capability.name().to_string(),
            description: capability.description().to_string(),
            parameters: capability.parameters(),
            input_binding: input,
            output_binding: output,
        }
    }
}
