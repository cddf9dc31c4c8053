//! ToolExecutor - dispatches model calls over the fixed capability table

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::domain::CallOutcome;
use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{CodeContextTool, ListFilesTool, ReadFilesTool, VerifyFilesTool, WriteFilesTool};
use super::{Tool, ToolContext, ToolError, ToolResult};

/// The closed set of operations the model may invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    GetCodeContext,
    ListFiles,
    ReadFiles,
    VerifyFiles,
    WriteFiles,
}

impl Capability {
    /// Offered to the model in this order
    pub const ALL: [Capability; 5] = [
        Capability::GetCodeContext,
        Capability::ListFiles,
        Capability::ReadFiles,
        Capability::VerifyFiles,
        Capability::WriteFiles,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Capability::GetCodeContext => "getCodeContext",
            Capability::ListFiles => "listFiles",
            Capability::ReadFiles => "readFiles",
            Capability::VerifyFiles => "verifyFiles",
            Capability::WriteFiles => "writeFiles",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    fn tool(&self) -> Box<dyn Tool> {
        match self {
            Capability::GetCodeContext => Box::new(CodeContextTool),
            Capability::ListFiles => Box::new(ListFilesTool),
            Capability::ReadFiles => Box::new(ReadFilesTool),
            Capability::VerifyFiles => Box::new(VerifyFilesTool),
            Capability::WriteFiles => Box::new(WriteFilesTool),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Executes capability calls and records them in the run's call log
pub struct ToolExecutor {
    tools: HashMap<Capability, Box<dyn Tool>>,
}

impl ToolExecutor {
    pub fn new() -> Self {
        let tools = Capability::ALL.into_iter().map(|c| (c, c.tool())).collect();
        Self { tools }
    }

    /// Capability definitions for the model
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        Capability::ALL
            .iter()
            .filter_map(|c| self.tools.get(c))
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect()
    }

    /// Execute one call
    ///
    /// Unknown names are reported back to the model. Fatal errors are
    /// recorded in the call log and returned.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(name = %call.name, id = %call.id, "ToolExecutor::execute: called");

        let Some(tool) = Capability::parse(&call.name).and_then(|c| self.tools.get(&c)) else {
            warn!(name = %call.name, "Model called an unknown capability");
            let result = ToolResult::error(format!(
                "Unknown capability: {}. Available: {}",
                call.name,
                Capability::ALL.map(|c| c.name()).join(", ")
            ));
            ctx.record_call(
                &call.name,
                call.input.clone(),
                CallOutcome::Result {
                    value: result.value(),
                    is_error: true,
                },
            )
            .await;
            return Ok(result);
        };

        match tool.execute(call.input.clone(), ctx).await {
            Ok(result) => {
                ctx.record_call(
                    &call.name,
                    call.input.clone(),
                    CallOutcome::Result {
                        value: result.value(),
                        is_error: result.is_error,
                    },
                )
                .await;
                Ok(result)
            }
            Err(e) => {
                warn!(name = %call.name, kind = e.kind(), error = %e, "Capability failed");
                ctx.record_call(
                    &call.name,
                    call.input.clone(),
                    CallOutcome::Error {
                        message: e.to_string(),
                    },
                )
                .await;
                Err(e)
            }
        }
    }
}

impl Default for ToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::test_support::Fixture;
    use serde_json::json;

    #[test]
    fn test_capability_names_round_trip() {
        for c in Capability::ALL {
            assert_eq!(Capability::parse(c.name()), Some(c));
        }
        assert_eq!(Capability::parse("bash"), None);
    }

    #[test]
    fn test_definitions_in_fixed_order() {
        let names: Vec<_> = ToolExecutor::new().definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec!["getCodeContext", "listFiles", "readFiles", "verifyFiles", "writeFiles"]
        );
    }

    #[tokio::test]
    async fn test_unknown_capability_is_recoverable_and_logged() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let call = ToolCall::new("c1", "deleteEverything", json!({}));

        let result = ToolExecutor::new().execute(&call, &ctx).await.unwrap();

        assert!(result.is_error);
        assert!(result.content.contains("Unknown capability"));
        assert_eq!(ctx.call_log().await.names(), vec!["deleteEverything"]);
    }

    #[tokio::test]
    async fn test_fatal_error_is_logged() {
        let fx = Fixture::new();
        let ctx = fx.context(None);
        let call = ToolCall::new(
            "c1",
            "writeFiles",
            json!({"files": [{"path": "exercises/odd-one-out/a.ts", "content": "x"}]}),
        );

        let err = ToolExecutor::new().execute(&call, &ctx).await.unwrap_err();

        assert!(matches!(err, ToolError::UnverifiedWrite { .. }));
        let log = ctx.call_log().await;
        assert!(matches!(log.entries()[0].outcome, CallOutcome::Error { .. }));
    }
}
