//! Agent-to-agent delegation for Conductor.
//!
//! Both ends of the delegation protocol live here. A specialist keeps a
//! [`TaskRegistry`] and exposes it through [`SpecialistServer`]; the
//! orchestrator reaches specialists through a [`DelegationTransport`],
//! normally the HTTP [`DelegationClient`].
//!
//! # Wire surface
//!
//! | verb | route | meaning |
//! |---|---|---|
//! | `POST` | `/tasks` | submit, answers `{task_id, status: "accepted"}` |
//! | `GET` | `/tasks/{id}?wait=bool` | snapshot, optionally blocking until terminal |
//! | `DELETE` | `/tasks/{id}` | cancel, `204` when acknowledged |
//! | `GET` | `/tasks/{id}/stream` | server-sent status events |
//! | `GET` | `/health` | reachability |

/// Delegation client and transport trait.
#[cfg(feature = "client")]
pub mod client;
/// Registry and client settings.
pub mod config;
/// Per-specialist task registry.
pub mod registry;
/// Specialist HTTP routes.
pub mod server;
/// Durable task storage.
pub mod store;

#[cfg(feature = "client")]
pub use client::{DelegationClient, DelegationHandle, DelegationTransport};
pub use config::{ClientConfig, RegistryConfig};
pub use registry::{TaskLease, TaskRegistry};
pub use server::{SpecialistServer, TaskHandler};
pub use store::{MemoryTaskStore, TaskStore};
