//! JSON bodies exchanged between the orchestrator and a specialist.

use crate::task::{TaskRecord, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header carried on every delegation request.
pub const PROTOCOL_VERSION_HEADER: &str = "X-Protocol-Version";
/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: &str = "0.2.5";
/// Sentinel payload closing a task event stream.
pub const STREAM_DONE: &str = "[DONE]";

/// Body of `POST {agent}/tasks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
    #[serde(default)]
    pub context_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl SubmitRequest {
    pub fn new(
        message: impl Into<String>,
        context_id: impl Into<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            message: message.into(),
            context_id: context_id.into(),
            metadata,
            timestamp: Utc::now(),
        }
    }
}

/// Successful response to a submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitAccepted {
    /// Missing only when a misbehaving specialist omits it.
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default = "default_accepted")]
    pub status: String,
    #[serde(default)]
    pub context_id: Option<String>,
}

fn default_accepted() -> String {
    "accepted".to_string()
}

/// Body of `GET {agent}/tasks/{task_id}`: a read-only view of a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub context_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&TaskRecord> for TaskSnapshot {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id.clone(),
            status: record.status,
            result: record.result.clone(),
            error: record.error.clone(),
            metadata: record.input.metadata.clone(),
            context_id: Some(record.input.context_id.clone()),
            created_at: Some(record.created_at),
            started_at: record.started_at,
            completed_at: record.completed_at,
        }
    }
}

/// One entry of a task event stream (`GET {agent}/tasks/{task_id}/stream`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<&TaskRecord> for TaskEvent {
    fn from(record: &TaskRecord) -> Self {
        Self {
            task_id: record.task_id.clone(),
            status: record.status,
            result: record.result.clone(),
            error: record.error.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskInput;
    use serde_json::json;

    #[test]
    fn test_submit_request_shape() {
        let req = SubmitRequest::new("do it", "ctx", HashMap::new());
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["message"], "do it");
        assert_eq!(value["context_id"], "ctx");
        assert!(value["metadata"].is_object());
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_submit_accepted_tolerates_extra_fields() {
        let accepted: SubmitAccepted =
            serde_json::from_value(json!({"task_id": "abc", "queue": 3})).unwrap();
        assert_eq!(accepted.task_id.as_deref(), Some("abc"));
        assert_eq!(accepted.status, "accepted");
    }

    #[test]
    fn test_snapshot_from_record() {
        let mut metadata = HashMap::new();
        metadata.insert("origin".to_string(), json!("test"));
        let mut record =
            TaskRecord::new("t9", TaskInput::new("m", "ctx-9").with_metadata(metadata));
        record.apply(TaskStatus::Completed, Some(json!({"ok": true})), None);

        let snap = TaskSnapshot::from(&record);
        assert_eq!(snap.task_id, "t9");
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.result, Some(json!({"ok": true})));
        assert_eq!(snap.metadata["origin"], "test");
        assert_eq!(snap.context_id.as_deref(), Some("ctx-9"));
    }

    #[test]
    fn test_minimal_snapshot_parses() {
        let snap: TaskSnapshot =
            serde_json::from_value(json!({"task_id": "x", "status": "timeout"})).unwrap();
        assert_eq!(snap.status, TaskStatus::Timeout);
        assert!(snap.result.is_none());
        assert!(snap.metadata.is_empty());
    }
}
