//! The five exercise capabilities

mod code_context;
mod list_files;
mod read_files;
mod verify_files;
mod write_files;

pub use code_context::CodeContextTool;
pub use list_files::ListFilesTool;
pub use read_files::ReadFilesTool;
pub use verify_files::VerifyFilesTool;
pub use write_files::WriteFilesTool;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::domain::{Fingerprint, SourceFile, fingerprint};
use crate::tools::ToolResult;

/// Input of the capabilities that take a candidate file set
#[derive(Debug, Deserialize)]
struct FilesInput {
    files: Vec<SourceFile>,
}

fn files_schema(description: &str) -> Value {
    json!({
        "type": "object",
        "properties": {
            "files": {
                "type": "array",
                "description": description,
                "items": {
                    "type": "object",
                    "properties": {
                        "path": { "type": "string" },
                        "content": { "type": "string" }
                    },
                    "required": ["path", "content"]
                }
            }
        },
        "required": ["files"]
    })
}

/// Fingerprint an authorized candidate; empty or ambiguous sets go back to the model
fn candidate_fingerprint(candidate: &[SourceFile]) -> Result<Fingerprint, ToolResult> {
    if candidate.is_empty() {
        return Err(ToolResult::error("files must contain at least one file"));
    }
    fingerprint(candidate).map_err(|path| ToolResult::error(format!("Duplicate path in files: {}", path)))
}
