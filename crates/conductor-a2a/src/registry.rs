use crate::config::RegistryConfig;
use crate::store::TaskStore;
use chrono::Utc;
use conductor_core::{ConductorError, TaskInput, TaskRecord, TaskStatus};
use parking_lot::RwLock;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

type Slot = Arc<Mutex<TaskRecord>>;

/// Write access to the record one [`TaskRegistry::create`] call made.
#[derive(Clone)]
pub struct TaskLease {
    task_id: String,
    slot: Slot,
}

impl TaskLease {
    pub fn task_id(&self) -> &str {
        &self.task_id
    }
}

/// In-process store of task records for one specialist.
///
/// Each task id owns its own lock, created on first access and dropped
/// only by [`TaskRegistry::evict`]. The map-level lock is held just long
/// enough to look up or insert a slot, so operations on different task
/// ids never wait on each other.
pub struct TaskRegistry {
    slots: RwLock<HashMap<String, Slot>>,
    store: Option<Arc<dyn TaskStore>>,
    config: RegistryConfig,
}

impl TaskRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            store: None,
            config,
        }
    }

    /// Write every record through to `store`.
    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Register a task in `pending` state. An existing record with the
    /// same id is replaced by a fresh one (and logged); this never fails.
    ///
    /// The returned lease writes only to the record created here. Once a
    /// later `create` reuses the id, transitions through an older lease
    /// are ignored.
    pub async fn create(&self, task_id: &str, input: TaskInput) -> TaskLease {
        let fresh = TaskRecord::new(task_id, input);
        let context_id = fresh.input.context_id.clone();
        let slot: Slot = Arc::new(Mutex::new(fresh));

        // Holding the retired record's lock keeps a leased write on it
        // from landing after the replacement.
        let previous = self.slot(task_id);
        let retired = match &previous {
            Some(old) => Some(old.lock().await),
            None => None,
        };
        if let Some(old) = &retired {
            warn!(task_id = %task_id, previous = %old.status, "Task already exists, overwriting");
        }
        let record = slot.lock().await;
        self.slots.write().insert(task_id.to_string(), slot.clone());
        drop(retired);
        self.persist(&record).await;
        drop(record);
        info!(task_id = %task_id, context_id = %context_id, "Created task");
        TaskLease {
            task_id: task_id.to_string(),
            slot,
        }
    }

    /// Move a task to `status`. Returns `false` when the task is unknown
    /// or already terminal; neither case is an error.
    pub async fn transition(
        &self,
        task_id: &str,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let Some(slot) = self.slot(task_id) else {
            warn!(task_id = %task_id, status = %status, "Transition on unknown task ignored");
            return false;
        };

        let mut record = slot.lock().await;
        self.apply_locked(&mut record, status, result, error).await
    }

    /// [`transition`](Self::transition) through a lease. Ignored when a
    /// later `create` or an eviction has retired the leased record.
    pub async fn transition_leased(
        &self,
        lease: &TaskLease,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let mut record = lease.slot.lock().await;
        let live = self
            .slots
            .read()
            .get(&lease.task_id)
            .is_some_and(|current| Arc::ptr_eq(current, &lease.slot));
        if !live {
            debug!(task_id = %lease.task_id, status = %status, "Task was superseded, transition ignored");
            return false;
        }
        self.apply_locked(&mut record, status, result, error).await
    }

    async fn apply_locked(
        &self,
        record: &mut TaskRecord,
        status: TaskStatus,
        result: Option<serde_json::Value>,
        error: Option<String>,
    ) -> bool {
        let from = record.status;
        if !record.apply(status, result, error) {
            warn!(task_id = %record.task_id, from = %from, to = %status, "Task is terminal, transition ignored");
            return false;
        }
        self.persist(record).await;
        info!(task_id = %record.task_id, from = %from, to = %status, "Updated task");
        true
    }

    /// Mark a task as `in_progress`.
    pub async fn start(&self, task_id: &str) -> bool {
        self.transition(task_id, TaskStatus::InProgress, None, None)
            .await
    }

    /// Mark a task as `completed` with its result.
    pub async fn complete(&self, task_id: &str, result: serde_json::Value) -> bool {
        self.transition(task_id, TaskStatus::Completed, Some(result), None)
            .await
    }

    /// Mark a task as `failed`.
    pub async fn fail(&self, task_id: &str, error: impl Into<String>) -> bool {
        self.transition(task_id, TaskStatus::Failed, None, Some(error.into()))
            .await
    }

    /// Mark a task as `cancelled`.
    pub async fn cancel(&self, task_id: &str) -> bool {
        self.transition(
            task_id,
            TaskStatus::Cancelled,
            None,
            Some("Task cancelled".to_string()),
        )
        .await
    }

    /// Read a task.
    ///
    /// Without `wait` this is an immediate snapshot. With `wait` the
    /// record is re-sampled every poll interval until it turns terminal
    /// or `timeout` elapses; the per-task lock is released between
    /// samples. On elapse the returned view is forced to `timeout` with a
    /// synthesized error, while the stored record keeps its real status.
    pub async fn get(&self, task_id: &str, wait: bool, timeout: Duration) -> Option<TaskRecord> {
        let snapshot = self.sample(task_id).await?;
        if !wait || snapshot.is_terminal() {
            return Some(snapshot);
        }

        let now = Instant::now();
        let deadline = now.checked_add(timeout).unwrap_or_else(|| far_future(now));
        loop {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;

            let current = self.sample(task_id).await?;
            if current.is_terminal() {
                return Some(current);
            }
        }

        let mut view = self.sample(task_id).await?;
        if !view.is_terminal() {
            debug!(task_id = %task_id, status = %view.status, "Wait window elapsed");
            view.status = TaskStatus::Timeout;
            view.result = None;
            view.error = Some(format!(
                "Task timed out after {} seconds",
                timeout.as_secs_f64()
            ));
        }
        Some(view)
    }

    /// Remove terminal records completed more than `older_than` ago,
    /// together with their locks. Returns how many were removed.
    pub async fn evict(&self, older_than: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(older_than)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age))
        else {
            return 0;
        };

        let slots: Vec<(String, Slot)> = self
            .slots
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();

        let mut expired = Vec::new();
        for (task_id, slot) in slots {
            let is_expired = {
                let record = slot.lock().await;
                record.is_terminal() && record.completed_at.is_some_and(|at| at < cutoff)
            };
            if is_expired {
                expired.push((task_id, slot));
            }
        }

        let mut map = self.slots.write();
        let mut removed = 0;
        for (task_id, slot) in &expired {
            // Re-check: a create may have reused the slot since it was sampled.
            let still_expired = map.get(task_id).is_some_and(|current| Arc::ptr_eq(current, slot))
                && slot.try_lock().is_ok_and(|record| {
                    record.is_terminal() && record.completed_at.is_some_and(|at| at < cutoff)
                });
            if still_expired {
                map.remove(task_id);
                removed += 1;
            }
        }
        removed
    }

    /// Run [`evict`](Self::evict) every sweep interval until the registry
    /// is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak: Weak<Self> = Arc::downgrade(self);
        let every = self.config.sweep_interval();
        let retention = self.config.retention();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(registry) = weak.upgrade() else {
                    break;
                };
                let removed = registry.evict(retention).await;
                if removed > 0 {
                    info!(removed, "Evicted expired tasks");
                }
            }
        })
    }

    /// Snapshot of every record, oldest first.
    pub async fn list(&self) -> Vec<TaskRecord> {
        let slots: Vec<Slot> = self.slots.read().values().cloned().collect();
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            records.push(slot.lock().await.clone());
        }
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.slots.read().contains_key(task_id)
    }

    pub fn len(&self) -> usize {
        self.slots.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.read().is_empty()
    }

    fn slot(&self, task_id: &str) -> Option<Slot> {
        self.slots.read().get(task_id).cloned()
    }

    async fn sample(&self, task_id: &str) -> Option<TaskRecord> {
        if let Some(slot) = self.slot(task_id) {
            return Some(slot.lock().await.clone());
        }
        match self.restore(task_id).await {
            Some(record) => Some(record),
            None => {
                warn!(
                    error = %ConductorError::RemoteTaskNotFound(task_id.to_string()),
                    "Task lookup failed"
                );
                None
            }
        }
    }

    /// Reload a record the store still holds but memory has lost.
    async fn restore(&self, task_id: &str) -> Option<TaskRecord> {
        let store = self.store.as_ref()?;
        let record = match store.load(task_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                error!(task_id = %task_id, error = %e, "Task store read failed");
                return None;
            }
        };

        let slot = self
            .slots
            .write()
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(record)))
            .clone();
        debug!(task_id = %task_id, "Restored task from store");
        let current = slot.lock().await.clone();
        Some(current)
    }

    async fn persist(&self, record: &TaskRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.save(record, self.config.store_ttl()).await {
                error!(task_id = %record.task_id, error = %e, "Task store write failed");
            }
        }
    }
}

/// Roughly 30 years out, the cap `tokio::time::sleep` applies as well.
fn far_future(now: Instant) -> Instant {
    now + Duration::from_secs(86_400 * 365 * 30)
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}
