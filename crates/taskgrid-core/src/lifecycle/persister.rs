//! Timed persistence writes with provenance bookkeeping.
//!
//! Every write runs after the caller has released its locks. The outcome is
//! recorded on the store as the task's persistence provenance so the
//! maintenance sweep can retry whatever is still `NotYetPersisted`.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{StorageProvenance, StorageStatus, Task, TaskId};
use crate::error::GridError;
use crate::ports::{Persistence, TaskRef};
use crate::store::TaskStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Save,
    Update,
}

pub struct Persister {
    backend: Arc<dyn Persistence>,
    store: Arc<TaskStore>,
    timeout: Duration,
}

impl Persister {
    pub fn new(backend: Arc<dyn Persistence>, store: Arc<TaskStore>, timeout: Duration) -> Self {
        Self {
            backend,
            store,
            timeout,
        }
    }

    /// Write `task` and record the result on the store.
    ///
    /// Failures are logged and never propagated; the returned provenance says
    /// whether the write landed.
    pub async fn write(&self, task: &Task, kind: WriteKind) -> StorageProvenance {
        let id = task.id();
        let provenance = match self.write_raw(task, kind).await {
            Ok(task_ref) => StorageProvenance::new(
                StorageStatus::Persisted,
                Some(task_ref.location),
                self.store.now(),
            ),
            Err(e) => {
                tracing::warn!(task_id = %id, ?kind, error = %e, "persistence write failed");
                StorageProvenance::new(StorageStatus::NotYetPersisted, None, self.store.now())
            }
        };
        self.store.set_persistence(id, provenance.clone());
        provenance
    }

    /// Write without touching the store. Used for records that are about to
    /// leave the cache.
    pub async fn write_raw(&self, task: &Task, kind: WriteKind) -> Result<TaskRef, GridError> {
        let call = async {
            match kind {
                WriteKind::Save => self.backend.save(task).await,
                WriteKind::Update => self.backend.update(task).await,
            }
        };
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| GridError::Timeout(self.timeout))?
    }

    pub async fn load(&self, task_id: TaskId) -> Result<Option<Task>, GridError> {
        tokio::time::timeout(self.timeout, self.backend.load(task_id))
            .await
            .map_err(|_| GridError::Timeout(self.timeout))?
    }

    /// Retry every write still marked `NotYetPersisted`. Returns the writes
    /// that landed this time.
    pub async fn retry_pending(&self) -> Vec<(TaskId, StorageProvenance)> {
        let mut landed = Vec::new();
        for id in self.store.pending_persistence() {
            let Some(task) = self.store.get(id) else {
                continue;
            };
            let kind = if task.status().rank() <= 1 {
                WriteKind::Save
            } else {
                WriteKind::Update
            };
            let provenance = self.write(&task, kind).await;
            if provenance.status == StorageStatus::Persisted {
                landed.push((id, provenance));
            }
        }
        if !landed.is_empty() {
            tracing::info!(count = landed.len(), "retried pending persistence");
        }
        landed
    }
}
