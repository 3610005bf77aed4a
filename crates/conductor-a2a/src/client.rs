use crate::config::ClientConfig;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::{
    ConductorError, ConductorResult, SubmitAccepted, SubmitRequest, TaskEvent, TaskSnapshot,
    TaskStatus, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, STREAM_DONE,
};
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use parking_lot::{Mutex, RwLock};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Correlates a submitted subtask with the remote task it became.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegationHandle {
    pub task_id: String,
    pub agent_address: String,
    pub context_id: String,
    pub submitted_at: DateTime<Utc>,
}

/// The four verbs the scheduler uses to talk to a specialist.
#[async_trait]
pub trait DelegationTransport: Send + Sync {
    /// Dispatch a task. Any transport or non-2xx failure is a
    /// [`ConductorError::Submission`]; no retry happens here.
    async fn submit(
        &self,
        agent_address: &str,
        message: &str,
        context_id: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> ConductorResult<DelegationHandle>;

    /// Read a remote task, optionally blocking in the remote's wait window.
    async fn await_result(
        &self,
        agent_address: &str,
        task_id: &str,
        wait: bool,
    ) -> ConductorResult<TaskSnapshot>;

    /// Whether the specialist answers its health check.
    async fn probe(&self, agent_address: &str) -> bool;

    /// Best-effort cancellation; `true` when the remote acknowledged.
    async fn cancel(&self, agent_address: &str, task_id: &str) -> bool;

    /// Forget handles once their request has been collected. Remote work
    /// is left alone.
    fn release(&self, _handles: &[DelegationHandle]) {}
}

#[derive(Debug, Clone)]
struct Tracked {
    handle: DelegationHandle,
    status: TaskStatus,
}

/// HTTP implementation of [`DelegationTransport`].
///
/// Keeps one connection pool per agent address, created on first use and
/// kept until [`close`](Self::close).
pub struct DelegationClient {
    config: ClientConfig,
    pools: RwLock<HashMap<String, reqwest::Client>>,
    in_flight: Mutex<HashMap<String, Tracked>>,
}

impl DelegationClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            pools: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn pool(&self, agent_address: &str) -> ConductorResult<reqwest::Client> {
        let key = agent_address.trim_end_matches('/');
        if let Some(client) = self.pools.read().get(key) {
            return Ok(client.clone());
        }

        let mut pools = self.pools.write();
        if let Some(client) = pools.get(key) {
            return Ok(client.clone());
        }
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(self.config.max_idle_per_host)
            .connect_timeout(self.config.request_timeout())
            .build()
            .map_err(|e| ConductorError::Http(e.to_string()))?;
        pools.insert(key.to_string(), client.clone());
        debug!(agent = %key, "Created connection pool");
        Ok(client)
    }

    /// Number of agent addresses with a live pool.
    pub fn pool_count(&self) -> usize {
        self.pools.read().len()
    }

    /// Handles whose remote task has not been seen in a terminal state.
    pub fn active_handles(&self) -> Vec<DelegationHandle> {
        self.in_flight
            .lock()
            .values()
            .filter(|t| !t.status.is_terminal())
            .map(|t| t.handle.clone())
            .collect()
    }

    /// Drop bookkeeping for finished tasks. Returns how many were dropped.
    pub fn clear_finished(&self) -> usize {
        let mut in_flight = self.in_flight.lock();
        let before = in_flight.len();
        in_flight.retain(|_, t| !t.status.is_terminal());
        let cleared = before - in_flight.len();
        info!(cleared, "Cleared finished delegations");
        cleared
    }

    /// Tear down every pool.
    pub fn close(&self) {
        self.pools.write().clear();
        info!("Delegation client closed");
    }

    /// Subscribe to the event stream of a remote task. The stream ends
    /// after the remote sends its terminal marker.
    pub async fn stream_events(
        &self,
        agent_address: &str,
        task_id: &str,
    ) -> ConductorResult<BoxStream<'static, ConductorResult<TaskEvent>>> {
        let client = self.pool(agent_address)?;
        let response = client
            .get(endpoint(agent_address, &format!("/tasks/{task_id}/stream")))
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| ConductorError::Http(e.to_string()))?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(ConductorError::RemoteTaskNotFound(task_id.to_string()))
            }
            status => {
                return Err(ConductorError::Http(format!(
                    "{agent_address} returned {status} for event stream"
                )))
            }
        }

        let state = (response.bytes_stream().boxed(), Vec::<u8>::new());
        let events = futures_util::stream::unfold(state, |(mut bytes, mut buffer)| async move {
            loop {
                if let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw);
                    let Some(data) = line.trim_end().strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == STREAM_DONE {
                        return None;
                    }
                    match serde_json::from_str::<TaskEvent>(data) {
                        Ok(event) => return Some((Ok(event), (bytes, buffer))),
                        Err(e) => {
                            warn!(error = %e, "Skipping malformed stream event");
                            continue;
                        }
                    }
                }

                match bytes.next().await {
                    Some(Ok(chunk)) => buffer.extend_from_slice(&chunk),
                    Some(Err(e)) => {
                        // Surface the error once, then end the stream.
                        let err = ConductorError::Http(e.to_string());
                        let ended = futures_util::stream::empty().boxed();
                        return Some((Err(err), (ended, Vec::new())));
                    }
                    None => return None,
                }
            }
        });

        Ok(events.boxed())
    }

    fn track_status(&self, task_id: &str, status: TaskStatus) {
        if let Some(tracked) = self.in_flight.lock().get_mut(task_id) {
            tracked.status = status;
        }
    }
}

impl Default for DelegationClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

#[async_trait]
impl DelegationTransport for DelegationClient {
    async fn submit(
        &self,
        agent_address: &str,
        message: &str,
        context_id: &str,
        metadata: HashMap<String, serde_json::Value>,
    ) -> ConductorResult<DelegationHandle> {
        let client = self
            .pool(agent_address)
            .map_err(|e| ConductorError::Submission(e.to_string()))?;
        let context_id = if context_id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            context_id.to_string()
        };

        let preview: String = message.chars().take(100).collect();
        info!(agent = %agent_address, message = %preview, "Submitting task");

        let body = SubmitRequest::new(message, context_id.clone(), metadata);
        let response = client
            .post(endpoint(agent_address, "/tasks"))
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .timeout(self.config.request_timeout())
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(agent = %agent_address, error = %e, "Submission failed");
                ConductorError::Submission(format!("{agent_address}: {e}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            error!(agent = %agent_address, status = %status, "Submission rejected");
            return Err(ConductorError::Submission(format!(
                "{agent_address} returned {status}: {text}"
            )));
        }

        let accepted: SubmitAccepted = response
            .json()
            .await
            .map_err(|e| ConductorError::Submission(format!("{agent_address}: {e}")))?;
        let task_id = accepted
            .task_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                ConductorError::Submission(format!(
                    "{agent_address} accepted the task without a task_id"
                ))
            })?;

        let handle = DelegationHandle {
            task_id: task_id.clone(),
            agent_address: agent_address.to_string(),
            context_id,
            submitted_at: Utc::now(),
        };
        self.in_flight.lock().insert(
            task_id.clone(),
            Tracked {
                handle: handle.clone(),
                status: TaskStatus::Pending,
            },
        );
        info!(agent = %agent_address, task_id = %task_id, "Task submitted");
        Ok(handle)
    }

    async fn await_result(
        &self,
        agent_address: &str,
        task_id: &str,
        wait: bool,
    ) -> ConductorResult<TaskSnapshot> {
        let client = self.pool(agent_address)?;
        debug!(agent = %agent_address, task_id = %task_id, wait, "Reading task");

        let response = client
            .get(endpoint(agent_address, &format!("/tasks/{task_id}")))
            .query(&[("wait", wait)])
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .send()
            .await
            .map_err(|e| {
                error!(agent = %agent_address, task_id = %task_id, error = %e, "Task read failed");
                ConductorError::Http(e.to_string())
            })?;

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                warn!(agent = %agent_address, task_id = %task_id, "Remote task not found");
                return Err(ConductorError::RemoteTaskNotFound(task_id.to_string()));
            }
            status => {
                return Err(ConductorError::Http(format!(
                    "{agent_address} returned {status} for task {task_id}"
                )))
            }
        }

        let snapshot: TaskSnapshot = response
            .json()
            .await
            .map_err(|e| ConductorError::Http(e.to_string()))?;
        self.track_status(task_id, snapshot.status);
        Ok(snapshot)
    }

    async fn probe(&self, agent_address: &str) -> bool {
        let Ok(client) = self.pool(agent_address) else {
            return false;
        };
        match client
            .get(endpoint(agent_address, "/health"))
            .timeout(self.config.probe_timeout())
            .send()
            .await
        {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(agent = %agent_address, error = %e, "Agent not reachable");
                false
            }
        }
    }

    async fn cancel(&self, agent_address: &str, task_id: &str) -> bool {
        info!(agent = %agent_address, task_id = %task_id, "Cancelling task");
        self.track_status(task_id, TaskStatus::Cancelled);

        let Ok(client) = self.pool(agent_address) else {
            return false;
        };
        match client
            .delete(endpoint(agent_address, &format!("/tasks/{task_id}")))
            .header(PROTOCOL_VERSION_HEADER, PROTOCOL_VERSION)
            .timeout(self.config.request_timeout())
            .send()
            .await
        {
            Ok(response) => matches!(response.status(), StatusCode::OK | StatusCode::NO_CONTENT),
            Err(e) => {
                error!(agent = %agent_address, task_id = %task_id, error = %e, "Cancel failed");
                false
            }
        }
    }

    fn release(&self, handles: &[DelegationHandle]) {
        let mut in_flight = self.in_flight.lock();
        for handle in handles {
            in_flight.remove(&handle.task_id);
        }
    }
}

fn endpoint(agent_address: &str, path: &str) -> String {
    format!("{}{path}", agent_address.trim_end_matches('/'))
}
