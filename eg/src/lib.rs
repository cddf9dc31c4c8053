//! exgen - verification-gated code generation for exercises
//!
//! A user turn drives a language model through a bounded sequence of
//! capability calls. Every candidate must pass the sandboxed verifier
//! before it is stored, and each exercise keeps a linear chain of
//! immutable snapshots.
//!
//! # Modules
//!
//! - [`guard`] - Path authorization for an exercise namespace
//! - [`snapshot`] - Snapshot backend over `snapstore`
//! - [`verify`] - Sandboxed type-check and lint gate
//! - [`state`] - Generation chain persistence (actor over SQLite)
//! - [`tools`] - The capabilities exposed to the model
//! - [`agent`] - The bounded orchestration loop
//! - [`service`] - One user turn, end to end
//! - [`server`] - HTTP submission endpoint
//! - [`llm`] - LLM client trait and Anthropic implementation
//! - [`config`] - Configuration types and loading

pub mod agent;
pub mod cli;
pub mod config;
pub mod domain;
pub mod guard;
pub mod llm;
pub mod references;
pub mod server;
pub mod service;
pub mod snapshot;
pub mod state;
pub mod tools;
pub mod verify;

pub use config::Config;
