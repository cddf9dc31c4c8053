//! readFiles - current files of the exercise

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::domain::SourceFile;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

pub struct ReadFilesTool;

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &'static str {
        "readFiles"
    }

    fn description(&self) -> &'static str {
        "Read every file of the exercise as it stands after the last completed generation. Empty for a new exercise."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {}
        })
    }

    async fn execute(&self, _input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(base = ?ctx.base_snapshot_ref(), "ReadFilesTool::execute: called");
        let namespace = ctx.namespace();
        let files: Vec<SourceFile> = ctx
            .base_files()
            .await?
            .into_iter()
            .map(|f| SourceFile::new(namespace.to_repo_path(&f.path), f.content))
            .collect();

        Ok(ToolResult::json(&files))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::context::test_support::Fixture;

    #[tokio::test]
    async fn test_read_empty_for_new_exercise() {
        let fx = Fixture::new();
        let result = ReadFilesTool.execute(Value::Null, &fx.context(None)).await.unwrap();
        assert_eq!(result.value(), json!([]));
    }

    #[tokio::test]
    async fn test_read_base_snapshot() {
        let fx = Fixture::new();
        let base = fx.seed(vec![SourceFile::new("index.tsx", "export {}")]).await;

        let result = ReadFilesTool.execute(Value::Null, &fx.context(Some(base))).await.unwrap();

        assert_eq!(
            result.value(),
            json!([{"path": "exercises/odd-one-out/index.tsx", "content": "export {}"}])
        );
    }

    #[tokio::test]
    async fn test_unreachable_snapshot_aborts() {
        let fx = Fixture::new();
        let ctx = fx.context(Some("019a0000-0000-7000-8000-0000000000aa".to_string()));

        let err = ReadFilesTool.execute(Value::Null, &ctx).await.unwrap_err();
        assert_eq!(err.kind(), "SnapshotFetchError");
    }
}
