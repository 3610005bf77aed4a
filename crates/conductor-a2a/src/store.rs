use async_trait::async_trait;
use conductor_core::{ConductorResult, TaskRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Durable backing for a [`TaskRegistry`](crate::TaskRegistry).
///
/// A key-value store with per-key expiry. The registry writes every
/// record through on create and transition, and reads from it only when
/// a task id is missing in memory.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Persist `record`, expiring it after `ttl`.
    async fn save(&self, record: &TaskRecord, ttl: Duration) -> ConductorResult<()>;

    /// Load a record that has not expired yet.
    async fn load(&self, task_id: &str) -> ConductorResult<Option<TaskRecord>>;
}

/// In-process [`TaskStore`] with per-key expiry.
#[derive(Default)]
pub struct MemoryTaskStore {
    entries: Mutex<HashMap<String, (TaskRecord, Instant)>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until next touched.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn save(&self, record: &TaskRecord, ttl: Duration) -> ConductorResult<()> {
        let expires_at = Instant::now() + ttl;
        self.entries
            .lock()
            .insert(record.task_id.clone(), (record.clone(), expires_at));
        Ok(())
    }

    async fn load(&self, task_id: &str) -> ConductorResult<Option<TaskRecord>> {
        let mut entries = self.entries.lock();
        let expired = match entries.get(task_id) {
            None => return Ok(None),
            Some((_, expires_at)) => *expires_at <= Instant::now(),
        };
        if expired {
            entries.remove(task_id);
            return Ok(None);
        }
        Ok(entries.get(task_id).map(|(record, _)| record.clone()))
    }
}
