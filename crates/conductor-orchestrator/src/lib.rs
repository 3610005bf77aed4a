//! Request orchestration for Conductor.
//!
//! A request is decomposed into [`Subtask`]s, grouped into dependency
//! [`Wave`]s and delegated to remote specialists by the
//! [`DependencyScheduler`]. Every outcome, including failures and
//! timeouts, is handed to the [`ResultAggregator`], which always produces
//! an [`Artifact`].
//!
//! # Main types
//!
//! - [`Orchestrator`] — Plan → execute → synthesize pipeline for one request.
//! - [`DependencyScheduler`] — Wave dispatch and deadline-bounded collection.
//! - [`ResultAggregator`] — Structured merge, error summary, reasoning fallback.
//! - [`Decomposer`] / [`ReasoningEngine`] — Collaborator seams.
//! - [`OrchestratorConfig`] — TOML configuration.

/// Outcome aggregation.
pub mod aggregator;
/// Orchestrator configuration.
pub mod config;
/// Request decomposition.
pub mod decompose;
/// Orchestration pipeline.
pub mod engine;
/// Reasoning-engine collaborators.
pub mod reasoning;
/// Wave scheduling and result collection.
pub mod scheduler;
/// Subtasks, outcomes and artifacts.
pub mod types;

pub use aggregator::ResultAggregator;
pub use config::{
    AgentEndpoints, AggregationConfig, OrchestratorConfig, PlannerKind, ReasoningConfig,
};
pub use decompose::{Decomposer, KeywordDecomposer, ReasoningDecomposer};
pub use engine::{AgentStatus, Connection, Orchestrator, OrchestratorResult};
pub use reasoning::{ChatCompletionsEngine, ReasoningEngine, UnavailableReasoning};
pub use scheduler::{DependencyScheduler, Dispatch, Dispatched, ScheduleReport};
pub use types::{Artifact, ArtifactKind, Outcome, OutcomeSet, Subtask, Wave};
