//! Actionable task: identity plus the mutable records the grid maintains.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TaskId;
use super::manifest::Payload;
use super::participant::ParticipantName;
use super::status::{FulfillmentStatus, OutcomeStatus};

/// Who may perform a task: named participants and/or capability tags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformerRequirement {
    #[serde(default)]
    pub participants: BTreeSet<ParticipantName>,
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
}

impl PerformerRequirement {
    pub fn participant(name: ParticipantName) -> Self {
        let mut req = Self::default();
        req.participants.insert(name);
        req
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.capabilities.is_empty()
    }

    /// Union with another requirement (idempotent re-registration).
    pub fn merge(&mut self, other: &PerformerRequirement) {
        self.participants.extend(other.participants.iter().cloned());
        self.capabilities.extend(other.capabilities.iter().cloned());
    }

    /// Flattened performer types, as kept on the registration record.
    pub fn performer_types(&self) -> BTreeSet<String> {
        self.participants
            .iter()
            .map(|p| format!("participant:{p}"))
            .chain(self.capabilities.iter().map(|c| format!("capability:{c}")))
            .collect()
    }
}

/// Ingress payload plus whatever the performer produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub ingress: Payload,
    #[serde(default)]
    pub egress: Vec<Payload>,
}

/// Lifecycle status plus the instants at which it moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub status: FulfillmentStatus,
    pub registered_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub finalised_at: Option<DateTime<Utc>>,
}

impl Default for Fulfillment {
    fn default() -> Self {
        Self {
            status: FulfillmentStatus::Unregistered,
            registered_at: None,
            started_at: None,
            finished_at: None,
            cancelled_at: None,
            finalised_at: None,
        }
    }
}

/// What happened downstream of a completed task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionSummary {
    /// Downstream task id -> participant it was created for.
    pub downstream: BTreeMap<TaskId, ParticipantName>,
    pub last_in_chain: bool,
    pub finalised: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    id: TaskId,
    pub performers: PerformerRequirement,
    pub work_item: WorkItem,
    pub fulfillment: Fulfillment,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<OutcomeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion: Option<CompletionSummary>,
    /// Predecessor task ids, oldest first.
    #[serde(default)]
    pub journey: Vec<TaskId>,
}

impl Task {
    pub fn new(id: TaskId, ingress: Payload) -> Self {
        Self {
            id,
            performers: PerformerRequirement::default(),
            work_item: WorkItem {
                ingress,
                egress: Vec::new(),
            },
            fulfillment: Fulfillment::default(),
            outcome: None,
            completion: None,
            journey: Vec::new(),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn status(&self) -> FulfillmentStatus {
        self.fulfillment.status
    }

    pub fn with_performer(mut self, participant: ParticipantName) -> Self {
        self.performers.participants.insert(participant);
        self
    }

    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.performers.capabilities.insert(capability.into());
        self
    }

    pub fn with_egress(mut self, payload: Payload) -> Self {
        self.work_item.egress.push(payload);
        self
    }

    /// Whether `participant` is explicitly named as a performer.
    pub fn is_targeted_at(&self, participant: &ParticipantName) -> bool {
        self.performers.participants.contains(participant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::manifest::Manifest;

    fn sample() -> Task {
        Task::new(
            TaskId::from_parts(1, 1),
            Payload::new(Manifest::core("Order"), serde_json::json!({"n": 1})),
        )
    }

    #[test]
    fn new_task_is_unregistered() {
        let t = sample();
        assert_eq!(t.status(), FulfillmentStatus::Unregistered);
        assert!(t.completion.is_none());
        assert!(t.performers.is_empty());
    }

    #[test]
    fn performer_merge_is_a_union() {
        let mut a = PerformerRequirement::participant(ParticipantName::new("Billing"));
        let mut b = PerformerRequirement::participant(ParticipantName::new("Billing"));
        b.participants.insert(ParticipantName::new("Audit"));
        b.capabilities.insert("pdf".to_string());
        a.merge(&b);
        assert_eq!(a.participants.len(), 2);
        assert_eq!(a.capabilities.len(), 1);
        assert!(a.performer_types().contains("capability:pdf"));
    }

    #[test]
    fn task_roundtrip_json() {
        let t = sample()
            .with_performer(ParticipantName::new("Billing"))
            .with_egress(Payload::new(
                Manifest::core("Order").with_content("Invoice"),
                serde_json::Value::Null,
            ));
        let s = serde_json::to_string(&t).unwrap();
        let back: Task = serde_json::from_str(&s).unwrap();
        assert_eq!(back, t);
    }
}
