use crate::config::AgentEndpoints;
use crate::types::{Outcome, OutcomeSet, Subtask, Wave};
use conductor_a2a::{DelegationHandle, DelegationTransport};
use conductor_core::{AgentKind, ConductorError, ConductorResult, TaskSnapshot, TaskStatus};
use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// A subtask that reached its specialist.
#[derive(Debug, Clone, Serialize)]
pub struct Dispatched {
    pub agent: AgentKind,
    pub handle: DelegationHandle,
}

/// State between dispatch and collection: outcomes already known
/// (submission failures) plus the handles still to be awaited.
#[derive(Debug, Default)]
pub struct Dispatch {
    pub outcomes: OutcomeSet,
    pub handles: Vec<Dispatched>,
}

/// Everything one scheduling pass produced.
#[derive(Debug)]
pub struct ScheduleReport {
    pub waves: Vec<Wave>,
    pub handles: Vec<Dispatched>,
    pub outcomes: OutcomeSet,
}

/// Orders subtasks into waves, dispatches them and collects their outcomes.
///
/// Dispatch and collection are separate phases: every wave is submitted
/// before any result is awaited, so a later wave only waits for the
/// earlier one to be *dispatched*, never for it to finish.
pub struct DependencyScheduler {
    transport: Arc<dyn DelegationTransport>,
    endpoints: AgentEndpoints,
    collection_deadline: Duration,
}

impl DependencyScheduler {
    pub fn new(
        transport: Arc<dyn DelegationTransport>,
        endpoints: AgentEndpoints,
        collection_deadline: Duration,
    ) -> Self {
        Self {
            transport,
            endpoints,
            collection_deadline,
        }
    }

    /// Group subtasks by dependency count, ascending.
    ///
    /// Only the number of declared dependencies matters, not which agents
    /// are named. Within a wave, subtasks keep decomposition order after a
    /// stable sort on priority.
    pub fn plan_waves(subtasks: &[Subtask]) -> Vec<Wave> {
        let mut levels: BTreeMap<usize, Vec<Subtask>> = BTreeMap::new();
        for subtask in subtasks {
            levels
                .entry(subtask.dependency_level())
                .or_default()
                .push(subtask.clone());
        }
        levels
            .into_iter()
            .map(|(level, mut subtasks)| {
                subtasks.sort_by_key(|s| s.priority);
                Wave { level, subtasks }
            })
            .collect()
    }

    /// Submit every wave in order. A wave starts only after each
    /// submission of the previous one has resolved; failed submissions
    /// become `error` outcomes and never stop their siblings.
    pub async fn dispatch(&self, waves: &[Wave], context_id: &str) -> Dispatch {
        let mut dispatch = Dispatch::default();

        for wave in waves {
            info!(level = wave.level, agents = ?wave.agents(), "Dispatching wave");
            let submissions = wave
                .subtasks
                .iter()
                .map(|subtask| self.submit(subtask, wave.level, context_id));
            let results = futures_util::future::join_all(submissions).await;

            for (subtask, result) in wave.subtasks.iter().zip(results) {
                match result {
                    Ok(handle) => dispatch.handles.push(Dispatched {
                        agent: subtask.agent,
                        handle,
                    }),
                    Err(e) => {
                        error!(agent = %subtask.agent, error = %e, "Subtask submission failed");
                        dispatch
                            .outcomes
                            .insert(subtask.agent, Outcome::error(e.to_string()));
                    }
                }
            }
        }
        dispatch
    }

    async fn submit(
        &self,
        subtask: &Subtask,
        level: usize,
        context_id: &str,
    ) -> ConductorResult<DelegationHandle> {
        let address = self.endpoints.address(subtask.agent);
        let mut metadata = HashMap::new();
        metadata.insert("agent".to_string(), serde_json::json!(subtask.agent));
        metadata.insert("priority".to_string(), serde_json::json!(subtask.priority));
        metadata.insert("wave".to_string(), serde_json::json!(level));
        info!(agent = %subtask.agent, task = %subtask.description, "Delegating subtask");
        self.transport
            .submit(address, &subtask.description, context_id, metadata)
            .await
    }

    /// Await every dispatched handle concurrently under one shared
    /// deadline. Outcomes that arrived in time are kept; handles still
    /// outstanding when the deadline fires become `timeout` outcomes.
    /// Remote work is not cancelled.
    pub async fn collect(&self, dispatch: Dispatch) -> OutcomeSet {
        let Dispatch {
            mut outcomes,
            handles,
        } = dispatch;

        let mut outstanding: HashMap<String, AgentKind> = handles
            .iter()
            .map(|d| (d.handle.task_id.clone(), d.agent))
            .collect();

        let mut pending: FuturesUnordered<_> = handles
            .iter()
            .map(|d| {
                let transport = self.transport.clone();
                let handle = d.handle.clone();
                let agent = d.agent;
                async move {
                    let read = transport
                        .await_result(&handle.agent_address, &handle.task_id, true)
                        .await;
                    (agent, handle.task_id, read)
                }
            })
            .collect();

        let deadline = tokio::time::sleep(self.collection_deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                next = pending.next() => match next {
                    Some((agent, task_id, read)) => {
                        outstanding.remove(&task_id);
                        outcomes.insert(agent, outcome_from_read(agent, &task_id, read));
                    }
                    None => break,
                },
                _ = &mut deadline => {
                    let timeout = ConductorError::CollectionTimeout(self.collection_deadline);
                    for (task_id, agent) in outstanding.drain() {
                        warn!(agent = %agent, task_id = %task_id, error = %timeout, "Subtask still outstanding");
                        outcomes.insert(agent, Outcome::timeout(timeout.to_string()));
                    }
                    break;
                }
            }
        }

        self.transport.release(
            &handles
                .into_iter()
                .map(|d| d.handle)
                .collect::<Vec<_>>(),
        );
        outcomes
    }

    /// Plan, dispatch and collect.
    pub async fn execute(&self, subtasks: &[Subtask], context_id: &str) -> ScheduleReport {
        let waves = Self::plan_waves(subtasks);
        let dispatch = self.dispatch(&waves, context_id).await;
        let handles = dispatch.handles.clone();
        let outcomes = self.collect(dispatch).await;
        info!(
            waves = waves.len(),
            dispatched = handles.len(),
            completed = outcomes.successful().count(),
            "Collection finished"
        );
        ScheduleReport {
            waves,
            handles,
            outcomes,
        }
    }
}

fn outcome_from_read(
    agent: AgentKind,
    task_id: &str,
    read: ConductorResult<TaskSnapshot>,
) -> Outcome {
    let snapshot = match read {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(agent = %agent, task_id = %task_id, error = %e, "Could not read subtask result");
            return Outcome::error(e.to_string());
        }
    };

    let status = snapshot.status;
    let fallback = || format!("Task {status}");
    match status {
        TaskStatus::Completed => {
            let mut metadata: serde_json::Map<String, serde_json::Value> =
                snapshot.metadata.into_iter().collect();
            metadata.insert("task_id".to_string(), serde_json::json!(snapshot.task_id));
            if let Some(context_id) = &snapshot.context_id {
                metadata.insert("context_id".to_string(), serde_json::json!(context_id));
            }
            if let Some(completed_at) = snapshot.completed_at {
                metadata.insert("completed_at".to_string(), serde_json::json!(completed_at));
            }
            Outcome::Completed {
                result: snapshot.result.unwrap_or(serde_json::Value::Null),
                metadata: serde_json::Value::Object(metadata),
            }
        }
        TaskStatus::Failed | TaskStatus::Cancelled => {
            Outcome::error(snapshot.error.unwrap_or_else(fallback))
        }
        TaskStatus::Timeout | TaskStatus::Pending | TaskStatus::InProgress => {
            Outcome::timeout(snapshot.error.unwrap_or_else(fallback))
        }
    }
}
