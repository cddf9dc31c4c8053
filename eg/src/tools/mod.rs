//! Capabilities exposed to the model
//!
//! Each run gets a `ToolContext` scoped to one exercise namespace. Every
//! path a capability touches goes through the guard first.

pub(crate) mod context;
mod error;
mod executor;
mod gate;
mod traits;

pub mod builtin;

pub use context::ToolContext;
pub use error::ToolError;
pub use executor::{Capability, ToolExecutor};
pub use gate::VerificationGate;
pub use traits::{Tool, ToolResult};
