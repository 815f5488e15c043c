//! Persistence port - the durable record store behind the in-memory caches.
//!
//! All calls are treated as blocking I/O: the grid never awaits them while
//! holding a task or queue lock, and wraps them in a timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{Task, TaskId};
use crate::error::GridError;

/// Where the persisted copy of a task lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_id: TaskId,
    pub location: String,
}

#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save(&self, task: &Task) -> Result<TaskRef, GridError>;

    async fn update(&self, task: &Task) -> Result<TaskRef, GridError>;

    async fn load(&self, task_id: TaskId) -> Result<Option<Task>, GridError>;
}
