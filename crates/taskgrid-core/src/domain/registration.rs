//! Per-task registration record and queue entry pointer.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;

/// One record per task id, upserted on every registration or status touch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRegistration {
    pub task_id: TaskId,
    pub registered_at: DateTime<Utc>,
    pub checked_at: DateTime<Utc>,
    /// Components or participants currently fulfilling the task.
    pub fulfillers: BTreeSet<String>,
    pub performer_types: BTreeSet<String>,
}

impl TaskRegistration {
    pub fn new(task_id: TaskId, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            registered_at: now,
            checked_at: now,
            fulfillers: BTreeSet::new(),
            performer_types: BTreeSet::new(),
        }
    }

    /// Age in whole seconds relative to `now`.
    pub fn age_secs(&self, now: DateTime<Utc>) -> i64 {
        (now - self.registered_at).num_seconds()
    }
}

/// Where a copy of the entry lives and how it got there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageStatus {
    /// Held in the in-memory cache.
    Cached,
    /// Demoted out of memory; only the persistence copy remains.
    Offloaded,
    /// Written to persistence.
    Persisted,
    /// Persistence write failed or is still outstanding.
    NotYetPersisted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageProvenance {
    pub status: StorageStatus,
    pub location: Option<String>,
    pub at: DateTime<Utc>,
}

impl StorageProvenance {
    pub fn new(status: StorageStatus, location: Option<String>, at: DateTime<Utc>) -> Self {
        Self {
            status,
            location,
            at,
        }
    }
}

/// Thin pointer to a task in a participant queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub task_id: TaskId,
    pub sequence: u64,
    pub cache: StorageProvenance,
    pub persistence: StorageProvenance,
}

impl QueueEntry {
    /// Entry for a freshly cached task whose persistence outcome is not known yet.
    pub fn cached(task_id: TaskId, location: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            task_id,
            sequence: task_id.sequence(),
            cache: StorageProvenance::new(StorageStatus::Cached, Some(location.into()), now),
            persistence: StorageProvenance::new(StorageStatus::NotYetPersisted, None, now),
        }
    }

    pub fn with_persistence(mut self, provenance: StorageProvenance) -> Self {
        self.persistence = provenance;
        self
    }

    pub fn is_offloaded(&self) -> bool {
        self.cache.status == StorageStatus::Offloaded
    }
}
