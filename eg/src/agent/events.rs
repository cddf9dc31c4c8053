//! Events emitted while a turn runs

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Progress of one user turn, in order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentEvent {
    /// The turn is bound to a generation
    Started {
        generation_id: String,
        seq: u32,
        /// False when an in-flight generation was continued
        created: bool,
    },
    /// Model text, streamed in chunks
    Text { text: String },
    CapabilityCalled { id: String, name: String, input: Value },
    CapabilityResult {
        id: String,
        name: String,
        is_error: bool,
        content: String,
    },
    /// Verified files were stored and the generation completed
    Completed {
        generation_id: String,
        snapshot_ref: String,
        summary: String,
    },
    /// The budget ran out and the generation was marked failed
    Failed { generation_id: String, reason: String },
    /// The model answered without writing; the generation stays open
    AwaitingInput { generation_id: String, text: String },
    /// The turn aborted; carries a message safe to show the caller
    Error { message: String },
}

impl AgentEvent {
    /// SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            AgentEvent::Started { .. } => "started",
            AgentEvent::Text { .. } => "text",
            AgentEvent::CapabilityCalled { .. } => "capability-called",
            AgentEvent::CapabilityResult { .. } => "capability-result",
            AgentEvent::Completed { .. } => "completed",
            AgentEvent::Failed { .. } => "failed",
            AgentEvent::AwaitingInput { .. } => "awaiting-input",
            AgentEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AgentEvent::Completed { .. }
                | AgentEvent::Failed { .. }
                | AgentEvent::AwaitingInput { .. }
                | AgentEvent::Error { .. }
        )
    }
}

/// Optional destination for events
///
/// A dropped receiver never fails the run.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<AgentEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that discards everything
    pub fn none() -> Self {
        Self { tx: None }
    }

    pub fn is_active(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub async fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx
            && tx.send(event).await.is_err()
        {
            debug!("EventSink::emit: receiver dropped");
        }
    }
}
