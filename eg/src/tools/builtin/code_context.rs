//! getCodeContext - reference implementations from sibling exercises

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub struct CodeContextTool;

#[async_trait]
impl Tool for CodeContextTool {
    fn name(&self) -> &'static str {
        "getCodeContext"
    }

    fn description(&self) -> &'static str {
        "Return reference implementations from other exercises. Read-only; use them as examples of structure and style."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!("CodeContextTool::execute: called");
        match ctx.references().references().await {
            Ok(files) => {
                debug!(count = files.len(), "CodeContextTool::execute: references loaded");
                Ok(ToolResult::json(&files))
            }
            Err(e) => {
                warn!(error = %e, "Failed to load reference code");
                Ok(ToolResult::error("Reference code is unavailable right now"))
            }
        }
    }
}
