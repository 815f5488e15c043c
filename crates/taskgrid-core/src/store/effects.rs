//! Side effects of entering a fulfillment status.

use chrono::{DateTime, Utc};

use crate::domain::{FulfillmentStatus, Task};

/// Move `task` to `status`, stamping the instant that status owns.
///
/// Returns `false` (and leaves the task untouched) when the move would
/// regress the lifecycle.
pub fn apply_status(task: &mut Task, status: FulfillmentStatus, at: DateTime<Utc>) -> bool {
    if !task.fulfillment.status.can_advance_to(status) {
        return false;
    }
    let f = &mut task.fulfillment;
    match status {
        FulfillmentStatus::Unregistered | FulfillmentStatus::Waiting => {}
        FulfillmentStatus::Registered => {
            f.registered_at.get_or_insert(at);
        }
        FulfillmentStatus::Active => f.started_at = Some(at),
        FulfillmentStatus::Finished
        | FulfillmentStatus::Failed
        | FulfillmentStatus::NoActionRequired => f.finished_at = Some(at),
        FulfillmentStatus::Cancelled => f.cancelled_at = Some(at),
        FulfillmentStatus::Finalised => {
            f.finalised_at = Some(at);
            if let Some(summary) = task.completion.as_mut() {
                summary.finalised = true;
            }
        }
    }
    task.fulfillment.status = status;
    true
}
