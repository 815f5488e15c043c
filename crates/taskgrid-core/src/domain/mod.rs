//! Domain model (ids, manifests, subscriptions, tasks, statuses).

pub mod ids;
pub mod manifest;
pub mod participant;
pub mod registration;
pub mod status;
pub mod subscription;
pub mod task;

pub use ids::TaskId;
pub use manifest::{
    FlowDirection, Manifest, NormalisationStatus, ParcelType, Payload, PolicyApproval,
    ValidationStatus, WILDCARD,
};
pub use participant::{ParticipantName, ParticipantRef};
pub use registration::{QueueEntry, StorageProvenance, StorageStatus, TaskRegistration};
pub use status::{ExecutionControl, FulfillmentStatus, JobCard, OutcomeStatus};
pub use subscription::{ParticipantFilter, ParticipantRegistration, StatusFilter, Subscription};
pub use task::{CompletionSummary, Fulfillment, PerformerRequirement, Task, WorkItem};
