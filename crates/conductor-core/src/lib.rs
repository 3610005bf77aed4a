//! Core types and error definitions for Conductor.
//!
//! This crate holds everything shared between the orchestrator and the
//! specialist services it delegates to: the error taxonomy, the task
//! lifecycle record, and the JSON bodies of the delegation protocol.
//!
//! # Main types
//!
//! - [`ConductorError`] — Unified error enum for all Conductor crates.
//! - [`ConductorResult`] — Convenience alias for `Result<T, ConductorError>`.
//! - [`AgentKind`] — The specialist a subtask is routed to.
//! - [`TaskStatus`] / [`TaskRecord`] — Server-side task lifecycle.
//! - [`SubmitRequest`], [`TaskSnapshot`], [`TaskEvent`] — Wire bodies.

/// Specialist identities.
pub mod agent;
/// Error types.
pub mod error;
/// Task lifecycle state machine.
pub mod task;
/// Delegation protocol bodies and constants.
pub mod wire;

pub use agent::AgentKind;
pub use error::{ConductorError, ConductorResult};
pub use task::{TaskInput, TaskRecord, TaskStatus};
pub use wire::{
    SubmitAccepted, SubmitRequest, TaskEvent, TaskSnapshot, PROTOCOL_VERSION,
    PROTOCOL_VERSION_HEADER, STREAM_DONE,
};
