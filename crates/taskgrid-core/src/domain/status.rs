//! Task lifecycle statuses and execution-control directives.

use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::participant::ParticipantName;

/// Fulfillment status of a task.
///
/// State transitions:
/// - Unregistered -> Registered -> Active -> Finished | Failed -> Finalised
/// - Registered -> Waiting -> Active (no executor assigned yet)
/// - any non-final status -> Cancelled -> Finalised
/// - Registered | Waiting -> NoActionRequired -> Finalised (skips Active)
///
/// Statuses never regress; see `can_advance_to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Unregistered,
    Registered,
    Waiting,
    Active,
    Finished,
    Failed,
    Cancelled,
    NoActionRequired,
    Finalised,
}

impl FulfillmentStatus {
    /// Position in the lifecycle order. Terminal outcomes share a rank.
    pub fn rank(self) -> u8 {
        match self {
            FulfillmentStatus::Unregistered => 0,
            FulfillmentStatus::Registered => 1,
            FulfillmentStatus::Waiting => 2,
            FulfillmentStatus::Active => 3,
            FulfillmentStatus::Finished
            | FulfillmentStatus::Failed
            | FulfillmentStatus::Cancelled
            | FulfillmentStatus::NoActionRequired => 4,
            FulfillmentStatus::Finalised => 5,
        }
    }

    /// Finished, failed, cancelled or no-action-required: waiting to be finalised.
    pub fn is_terminal(self) -> bool {
        self.rank() == 4
    }

    pub fn is_finalised(self) -> bool {
        self == FulfillmentStatus::Finalised
    }

    /// Whether moving from `self` to `next` keeps the order non-decreasing.
    ///
    /// Re-applying the current status is allowed (idempotent callbacks);
    /// switching between two terminal outcomes is not.
    pub fn can_advance_to(self, next: FulfillmentStatus) -> bool {
        if self == next {
            return true;
        }
        if self.is_terminal() && next.is_terminal() {
            return false;
        }
        if next == FulfillmentStatus::NoActionRequired && self == FulfillmentStatus::Active {
            return false;
        }
        next.rank() > self.rank()
    }
}

/// Business outcome reported by the executing participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    Success,
    Failure,
    Cancelled,
    NoActionRequired,
}

/// Directive handed back to the participant after every callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionControl {
    Execute,
    Wait,
    Cancel,
    Fail,
    Finish,
    CleanUp,
}

/// Transient control record negotiating a task's next command between a
/// participant and the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCard {
    pub task_id: TaskId,
    pub participant: ParticipantName,
    pub status: FulfillmentStatus,
    pub control: ExecutionControl,
}
