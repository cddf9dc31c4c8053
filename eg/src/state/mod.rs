//! State management with actor pattern
//!
//! StateManager owns the GenerationStore and processes messages via
//! channels, serializing every generation lifecycle transition.

mod manager;
mod messages;
mod store;

pub use manager::{StateEvent, StateManager};
pub use messages::{OpenedGeneration, StateCommand, StateError, StateResponse};
pub use store::GenerationStore;
