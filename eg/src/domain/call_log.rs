//! Ordered record of capability calls made during one run

use serde::Serialize;
use serde_json::Value;

/// How a capability call ended
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOutcome {
    /// Result data returned to the model (including recoverable errors)
    Result { value: Value, is_error: bool },
    /// Fatal error that aborted the run
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub name: String,
    pub arguments: Value,
    pub outcome: CallOutcome,
}

/// Append-only log of capability calls for one orchestrator run
#[derive(Debug, Clone, Default, Serialize)]
pub struct CallLog {
    entries: Vec<CallRecord>,
}

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, name: impl Into<String>, arguments: Value, outcome: CallOutcome) {
        self.entries.push(CallRecord {
            name: name.into(),
            arguments,
            outcome,
        });
    }

    pub fn entries(&self) -> &[CallRecord] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names of the calls in order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_order() {
        let mut log = CallLog::new();
        log.record(
            "readFiles",
            Value::Null,
            CallOutcome::Result {
                value: serde_json::json!([]),
                is_error: false,
            },
        );
        log.record(
            "writeFiles",
            serde_json::json!({"files": []}),
            CallOutcome::Error {
                message: "unverified".to_string(),
            },
        );

        assert_eq!(log.len(), 2);
        assert_eq!(log.names(), vec!["readFiles", "writeFiles"]);
    }
}
