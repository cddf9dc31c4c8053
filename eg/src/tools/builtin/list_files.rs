//! listFiles - paths in the exercise namespace, optionally glob-filtered

use async_trait::async_trait;
use glob::{MatchOptions, Pattern};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::tools::traits::parse_input;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

#[derive(Debug, Deserialize)]
struct ListFilesInput {
    pattern: Option<String>,
}

pub struct ListFilesTool;

impl ListFilesTool {
    /// A pattern may be written against either the repository path or the
    /// namespace-relative one
    fn matches(pattern: &Pattern, relative: &str, repo_path: &str) -> bool {
        let options = MatchOptions {
            case_sensitive: true,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        pattern.matches_with(relative, options) || pattern.matches_with(repo_path, options)
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &'static str {
        "listFiles"
    }

    fn description(&self) -> &'static str {
        "List the paths of the exercise's current files, optionally filtered by a glob pattern (e.g. **/*.tsx)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern to filter paths"
                }
            }
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?input, "ListFilesTool::execute: called");
        let input: ListFilesInput = match parse_input(self.name(), input) {
            Ok(i) => i,
            Err(result) => return Ok(result),
        };

        let pattern = match input.pattern.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => match Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => return Ok(ToolResult::error(format!("Invalid glob pattern: {}", e))),
            },
            None => None,
        };

        let namespace = ctx.namespace();
        let paths: Vec<String> = ctx
            .base_files()
            .await?
            .into_iter()
            .map(|f| (namespace.to_repo_path(&f.path), f.path))
            .filter(|(repo_path, relative)| {
                pattern
                    .as_ref()
                    .is_none_or(|p| Self::matches(p, relative, repo_path))
            })
            .map(|(repo_path, _)| repo_path)
            .collect();

        debug!(count = paths.len(), "ListFilesTool::execute: listed");
        Ok(ToolResult::json(&paths))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceFile;
    use crate::tools::context::test_support::Fixture;

    async fn seeded() -> (Fixture, String) {
        let fx = Fixture::new();
        let base = fx
            .seed(vec![
                SourceFile::new("index.tsx", "a"),
                SourceFile::new("components/Card.tsx", "b"),
                SourceFile::new("styles.css", "c"),
            ])
            .await;
        (fx, base)
    }

    #[tokio::test]
    async fn test_lists_repo_paths() {
        let (fx, base) = seeded().await;
        let result = ListFilesTool.execute(Value::Null, &fx.context(Some(base))).await.unwrap();

        assert_eq!(
            result.value(),
            json!([
                "exercises/odd-one-out/components/Card.tsx",
                "exercises/odd-one-out/index.tsx",
                "exercises/odd-one-out/styles.css"
            ])
        );
    }

    #[tokio::test]
    async fn test_pattern_filters() {
        let (fx, base) = seeded().await;
        let ctx = fx.context(Some(base));

        let result = ListFilesTool.execute(json!({"pattern": "**/*.tsx"}), &ctx).await.unwrap();
        assert_eq!(result.value().as_array().unwrap().len(), 2);

        let result = ListFilesTool
            .execute(json!({"pattern": "exercises/odd-one-out/*.css"}), &ctx)
            .await
            .unwrap();
        assert_eq!(result.value(), json!(["exercises/odd-one-out/styles.css"]));
    }

    #[tokio::test]
    async fn test_empty_without_snapshot() {
        let fx = Fixture::new();
        let result = ListFilesTool.execute(json!({}), &fx.context(None)).await.unwrap();
        assert_eq!(result.value(), json!([]));
    }

    #[tokio::test]
    async fn test_invalid_pattern_is_recoverable() {
        let fx = Fixture::new();
        let result = ListFilesTool
            .execute(json!({"pattern": "[unclosed"}), &fx.context(None))
            .await
            .unwrap();
        assert!(result.is_error);
    }
}
