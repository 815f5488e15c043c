use thiserror::Error;

use crate::domain::{ParticipantName, TaskId};

#[derive(Debug, Error)]
pub enum GridError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("task not found: {0}")]
    NotFound(TaskId),

    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(String),

    #[error("queue full for participant={participant} (max={max})")]
    QueueFull {
        participant: ParticipantName,
        max: usize,
    },

    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("malformed manifest: {0}")]
    MalformedManifest(String),

    #[error("config error: {0}")]
    Config(String),
}

impl GridError {
    /// Failures worth retrying later; nothing has been lost.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GridError::PersistenceUnavailable(_) | GridError::Timeout(_)
        )
    }
}
