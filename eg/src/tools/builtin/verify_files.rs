//! verifyFiles - statically check a candidate file set

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::domain::merge_over;
use crate::tools::traits::parse_input;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult};

use super::{FilesInput, candidate_fingerprint, files_schema};

pub struct VerifyFilesTool;

#[async_trait]
impl Tool for VerifyFilesTool {
    fn name(&self) -> &'static str {
        "verifyFiles"
    }

    fn description(&self) -> &'static str {
        "Type-check and lint a candidate set of files (merged over the current files). \
         Returns ok plus diagnostics. writeFiles only accepts the exact set most recently verified with ok: true."
    }

    fn input_schema(&self) -> Value {
        files_schema("Files to verify; paths under exercises/<slug>/")
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        // A rejected call still replaces the previous verification
        ctx.clear_verification().await;

        let input: FilesInput = match parse_input(self.name(), input) {
            Ok(i) => i,
            Err(result) => return Ok(result),
        };
        debug!(count = input.files.len(), "VerifyFilesTool::execute: called");

        let candidate = ctx.authorize(input.files)?;
        let fingerprint = match candidate_fingerprint(&candidate) {
            Ok(fp) => fp,
            Err(result) => return Ok(result),
        };

        let base = ctx.base_files().await?;
        let merged = merge_over(&base, &candidate);
        let report = ctx.verifier().verify(&merged, ctx.namespace()).await?;

        info!(
            namespace = %ctx.namespace(),
            %fingerprint,
            ok = report.ok,
            errors = report.error_count(),
            "Candidate verified"
        );
        ctx.record_verification(fingerprint, report.ok).await;

        Ok(ToolResult::json(&json!({
            "ok": report.ok,
            "diagnostics": report.diagnostics,
        })))
    }
}
