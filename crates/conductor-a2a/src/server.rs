use crate::registry::TaskRegistry;
use async_trait::async_trait;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use conductor_core::{
    ConductorResult, SubmitAccepted, SubmitRequest, TaskEvent, TaskInput, TaskSnapshot,
    TaskStatus, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, STREAM_DONE,
};
use parking_lot::Mutex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

/// The work a specialist performs for one accepted task.
///
/// Implementations call whatever tools they need and return the
/// structured result; an `Err` marks the task `failed`.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, input: &TaskInput) -> ConductorResult<serde_json::Value>;
}

/// Shared state behind the specialist routes.
pub struct SpecialistState {
    agent: String,
    registry: Arc<TaskRegistry>,
    handler: Arc<dyn TaskHandler>,
    running: Mutex<HashMap<String, Worker>>,
    next_worker: AtomicU64,
}

/// A spawned handler run. `generation` tells apart successive runs
/// submitted under the same task id.
struct Worker {
    generation: u64,
    abort: AbortHandle,
}

/// HTTP surface of a specialist service.
pub struct SpecialistServer;

impl SpecialistServer {
    /// Build the router serving the delegation protocol for `agent`.
    pub fn build(
        agent: impl Into<String>,
        registry: Arc<TaskRegistry>,
        handler: Arc<dyn TaskHandler>,
    ) -> Router {
        let state = Arc::new(SpecialistState {
            agent: agent.into(),
            registry,
            handler,
            running: Mutex::new(HashMap::new()),
            next_worker: AtomicU64::new(0),
        });

        Router::new()
            .route("/health", get(health_handler))
            .route("/tasks", post(submit_handler))
            .route("/tasks/{task_id}", get(read_handler).delete(cancel_handler))
            .route("/tasks/{task_id}/stream", get(stream_handler))
            .with_state(state)
    }
}

async fn health_handler(State(state): State<Arc<SpecialistState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "agent": state.agent,
        "tasks": state.registry.len(),
    }))
}

async fn submit_handler(
    State(state): State<Arc<SpecialistState>>,
    headers: HeaderMap,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    let version = headers
        .get(PROTOCOL_VERSION_HEADER)
        .and_then(|v| v.to_str().ok());
    if version != Some(PROTOCOL_VERSION) {
        warn!(agent = %state.agent, version = ?version, "Unexpected protocol version");
    }

    let task_id = request
        .metadata
        .get("task_id")
        .and_then(|v| v.as_str())
        .filter(|id| !id.is_empty())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context_id = if request.context_id.is_empty() {
        Uuid::new_v4().to_string()
    } else {
        request.context_id
    };
    let mut metadata = request.metadata;
    metadata.insert("task_id".to_string(), serde_json::json!(task_id));

    let input = TaskInput {
        message: request.message,
        context_id: context_id.clone(),
        metadata,
    };
    if let Some(previous) = state.running.lock().remove(&task_id) {
        warn!(task_id = %task_id, "Task id resubmitted, aborting previous run");
        previous.abort.abort();
    }
    let lease = state.registry.create(&task_id, input.clone()).await;

    let generation = state.next_worker.fetch_add(1, Ordering::Relaxed);
    let worker_state = state.clone();
    // The entry goes in before the worker can reach its own removal.
    {
        let mut running = state.running.lock();
        let join = tokio::spawn(async move {
            let registry = &worker_state.registry;
            registry
                .transition_leased(&lease, TaskStatus::InProgress, None, None)
                .await;
            match worker_state.handler.handle(&input).await {
                Ok(result) => {
                    registry
                        .transition_leased(&lease, TaskStatus::Completed, Some(result), None)
                        .await;
                }
                Err(e) => {
                    error!(task_id = %lease.task_id(), error = %e, "Task handler failed");
                    registry
                        .transition_leased(&lease, TaskStatus::Failed, None, Some(e.to_string()))
                        .await;
                }
            }
            let mut running = worker_state.running.lock();
            if running
                .get(lease.task_id())
                .is_some_and(|worker| worker.generation == generation)
            {
                running.remove(lease.task_id());
            }
        });
        running.insert(
            task_id.clone(),
            Worker {
                generation,
                abort: join.abort_handle(),
            },
        );
    }

    info!(agent = %state.agent, task_id = %task_id, "Accepted task");
    Json(SubmitAccepted {
        task_id: Some(task_id),
        status: "accepted".to_string(),
        context_id: Some(context_id),
    })
}

#[derive(Debug, Deserialize)]
struct ReadQuery {
    #[serde(default)]
    wait: bool,
}

async fn read_handler(
    State(state): State<Arc<SpecialistState>>,
    Path(task_id): Path<String>,
    Query(query): Query<ReadQuery>,
) -> Response {
    let timeout = state.registry.config().wait_timeout();
    match state.registry.get(&task_id, query.wait, timeout).await {
        Some(record) => Json(TaskSnapshot::from(&record)).into_response(),
        None => not_found(&task_id),
    }
}

async fn cancel_handler(
    State(state): State<Arc<SpecialistState>>,
    Path(task_id): Path<String>,
) -> Response {
    if state.registry.cancel(&task_id).await {
        if let Some(worker) = state.running.lock().remove(&task_id) {
            worker.abort.abort();
        }
        info!(agent = %state.agent, task_id = %task_id, "Cancelled task");
        return StatusCode::NO_CONTENT.into_response();
    }

    if state.registry.contains(&task_id) {
        (
            StatusCode::CONFLICT,
            Json(serde_json::json!({"error": "task already finished", "task_id": task_id})),
        )
            .into_response()
    } else {
        not_found(&task_id)
    }
}

struct StreamCursor {
    registry: Arc<TaskRegistry>,
    task_id: String,
    poll: Duration,
    last: Option<TaskStatus>,
    done: bool,
}

async fn stream_handler(
    State(state): State<Arc<SpecialistState>>,
    Path(task_id): Path<String>,
) -> Response {
    if state.registry.get(&task_id, false, Duration::ZERO).await.is_none() {
        return not_found(&task_id);
    }

    let cursor = StreamCursor {
        registry: state.registry.clone(),
        poll: state.registry.config().poll_interval(),
        task_id,
        last: None,
        done: false,
    };

    let events = futures_util::stream::unfold(cursor, |mut cursor| async move {
        if cursor.done {
            return None;
        }
        loop {
            let record = cursor
                .registry
                .get(&cursor.task_id, false, Duration::ZERO)
                .await;
            let Some(record) = record else {
                cursor.done = true;
                return Some((Ok(Event::default().data(STREAM_DONE)), cursor));
            };

            if cursor.last != Some(record.status) {
                cursor.last = Some(record.status);
                return Some((Event::default().json_data(TaskEvent::from(&record)), cursor));
            }
            if record.is_terminal() {
                cursor.done = true;
                return Some((Ok(Event::default().data(STREAM_DONE)), cursor));
            }
            tokio::time::sleep(cursor.poll).await;
        }
    });

    Sse::new(events)
        .keep_alive(KeepAlive::default())
        .into_response()
}

fn not_found(task_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({"error": "task not found", "task_id": task_id})),
    )
        .into_response()
}
