use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Lifecycle status of a delegated task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Timeout,
    Cancelled,
}

impl TaskStatus {
    /// Terminal statuses admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Timeout | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Timeout => "timeout",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Write-once input of a task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskInput {
    pub message: String,
    pub context_id: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TaskInput {
    pub fn new(message: impl Into<String>, context_id: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context_id: context_id.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// The authoritative lifecycle record of one delegated unit of work.
///
/// `result` and `error` are mutually exclusive and both unset while the
/// status is non-terminal. Once terminal, [`TaskRecord::apply`] refuses
/// every further change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub status: TaskStatus,
    pub input: TaskInput,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, input: TaskInput) -> Self {
        Self {
            task_id: task_id.into(),
            status: TaskStatus::Pending,
            input,
            result: None,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Apply a status transition. Returns `false` (and changes nothing)
    /// when the record is already terminal.
    ///
    /// `result` is only kept for `Completed`; `error` only for `Failed`,
    /// `Timeout` and `Cancelled`. `Failed` and `Timeout` always carry an
    /// error message, synthesized when the caller gives none.
    pub fn apply(
        &mut self,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        let now = Utc::now();
        match status {
            TaskStatus::Pending => {}
            TaskStatus::InProgress => {
                if self.started_at.is_none() {
                    self.started_at = Some(now);
                }
            }
            TaskStatus::Completed => {
                self.result = result;
                self.error = None;
            }
            TaskStatus::Failed | TaskStatus::Timeout => {
                self.result = None;
                self.error = Some(error.unwrap_or_else(|| format!("Task {status}")));
            }
            TaskStatus::Cancelled => {
                self.result = None;
                self.error = error;
            }
        }

        if status.is_terminal() {
            self.completed_at = Some(now);
        }
        self.status = status;
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
