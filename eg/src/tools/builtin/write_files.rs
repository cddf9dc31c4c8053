//! writeFiles - persist a verified candidate as a new snapshot

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::merge_over;
use crate::tools::traits::parse_input;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::{FilesInput, candidate_fingerprint, files_schema};

pub struct WriteFilesTool;

#[async_trait]
impl Tool for WriteFilesTool {
    fn name(&self) -> &'static str {
        "writeFiles"
    }

    fn description(&self) -> &'static str {
        "Save the candidate files as the exercise's new version. The files must be exactly the set passed to the \
         most recent verifyFiles call, and that call must have returned ok: true. Ends the run."
    }

    fn input_schema(&self) -> Value {
        files_schema("Files to save; identical to the last verified set")
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let input: FilesInput = match parse_input(self.name(), input) {
            Ok(i) => i,
            Err(result) => return Ok(result),
        };
        debug!(count = input.files.len(), "WriteFilesTool::execute: called");

        let candidate = ctx.authorize(input.files)?;
        let fingerprint = match candidate_fingerprint(&candidate) {
            Ok(fp) => fp,
            Err(result) => return Ok(result),
        };
        ctx.require_verified(&fingerprint).await?;

        let base = ctx.base_files().await?;
        let merged = merge_over(&base, &candidate);
        let file_count = merged.len();
        let snapshot_ref = ctx
            .snapshots()
            .store(merged)
            .await
            .map_err(ToolError::SnapshotStore)?;

        info!(
            namespace = %ctx.namespace(),
            %snapshot_ref,
            files = file_count,
            "Snapshot written"
        );
        ctx.set_written(snapshot_ref.clone()).await;

        Ok(ToolResult::json(&json!({ "snapshotRef": snapshot_ref })))
    }
}
