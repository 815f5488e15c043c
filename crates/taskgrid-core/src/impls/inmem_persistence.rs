//! InMemoryPersistence - reference record store for development and tests.
//!
//! `set_available(false)` makes every call fail with
//! `PersistenceUnavailable`, and `set_delay` makes calls slow enough to
//! trip the grid's timeout.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::domain::{Task, TaskId};
use crate::error::GridError;
use crate::ports::{Persistence, TaskRef};

pub struct InMemoryPersistence {
    records: DashMap<TaskId, Task>,
    available: AtomicBool,
    delay_ms: AtomicU64,
    writes: AtomicUsize,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            available: AtomicBool::new(true),
            delay_ms: AtomicU64::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Number of successful writes (save + update).
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.records.contains_key(&task_id)
    }

    /// Persisted copy, bypassing the availability switch.
    pub fn snapshot(&self, task_id: TaskId) -> Option<Task> {
        self.records.get(&task_id).map(|t| t.value().clone())
    }

    async fn gate(&self) -> Result<(), GridError> {
        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if !self.available.load(Ordering::SeqCst) {
            return Err(GridError::PersistenceUnavailable(
                "in-memory store switched off".to_string(),
            ));
        }
        Ok(())
    }

    fn write(&self, task: &Task) -> TaskRef {
        self.records.insert(task.id(), task.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        TaskRef {
            task_id: task.id(),
            location: format!("memory://tasks/{}", task.id()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Persistence for InMemoryPersistence {
    async fn save(&self, task: &Task) -> Result<TaskRef, GridError> {
        self.gate().await?;
        Ok(self.write(task))
    }

    async fn update(&self, task: &Task) -> Result<TaskRef, GridError> {
        self.gate().await?;
        Ok(self.write(task))
    }

    async fn load(&self, task_id: TaskId) -> Result<Option<Task>, GridError> {
        self.gate().await?;
        Ok(self.snapshot(task_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Manifest, Payload};

    fn task() -> Task {
        Task::new(
            TaskId::from_parts(5, 1),
            Payload::new(Manifest::core("Order"), serde_json::Value::Null),
        )
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = InMemoryPersistence::new();
        let t = task();
        let r = store.save(&t).await.unwrap();
        assert_eq!(r.task_id, t.id());
        assert_eq!(store.load(t.id()).await.unwrap(), Some(t));
        assert_eq!(store.writes(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_fails_without_writing() {
        let store = InMemoryPersistence::new();
        store.set_available(false);
        let err = store.save(&task()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(store.writes(), 0);
    }
}
