//! Agent orchestrator
//!
//! One run is a single sequence of model round-trips. Capability calls
//! execute one at a time through the `ToolExecutor`.

mod engine;
mod events;
mod prompt;

pub use engine::{AgentEngine, AgentError, RunOutcome, RunStats};
pub use events::{AgentEvent, EventSink};
pub use prompt::PromptRenderer;
