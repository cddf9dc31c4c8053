//! Tool trait definition

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ToolContext, ToolError};

/// A capability the model can call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Capability name (matches the model's tool_use name)
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the capability
    ///
    /// `Ok` results go back to the model, including recoverable errors.
    /// `Err` aborts the run.
    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Result handed back to the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub content: String,
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }

    /// Successful result carrying `value` as JSON
    pub fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_string_pretty(value) {
            Ok(content) => Self::success(content),
            Err(e) => Self::error(format!("Failed to encode result: {}", e)),
        }
    }

    /// Content as structured data for the call log
    pub fn value(&self) -> Value {
        serde_json::from_str(&self.content).unwrap_or_else(|_| Value::String(self.content.clone()))
    }
}

/// Deserialize capability input, turning mistakes into a result the model can read
pub fn parse_input<T: DeserializeOwned>(tool: &str, input: Value) -> Result<T, ToolResult> {
    // Capabilities without parameters may be called with no input at all
    let input = if input.is_null() { Value::Object(Default::default()) } else { input };
    serde_json::from_value(input).map_err(|e| ToolResult::error(format!("Invalid input for {}: {}", tool, e)))
}
