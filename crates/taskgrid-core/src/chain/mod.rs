//! Task chain propagation: fan a finished task's output out to the next
//! participants.
//!
//! The propagator only builds successor tasks and updates the parent's
//! completion summary. Registering and queueing the successors is left to
//! the grid so that no lock is held across persistence.

use std::sync::Arc;

use crate::domain::{CompletionSummary, ParticipantName, PerformerRequirement, Task};
use crate::matcher;
use crate::ports::{IdGenerator, ParticipantDirectory};

/// Result of one propagation pass.
#[derive(Debug, Clone, Default)]
pub struct Propagation {
    /// Successor tasks, in egress payload order then subscriber name order.
    pub downstream: Vec<Task>,
    /// Egress payloads skipped because their manifest was malformed.
    pub skipped: usize,
    pub last_in_chain: bool,
}

pub struct TaskChainPropagator {
    ids: Arc<dyn IdGenerator>,
    directory: Arc<dyn ParticipantDirectory>,
}

impl TaskChainPropagator {
    pub fn new(ids: Arc<dyn IdGenerator>, directory: Arc<dyn ParticipantDirectory>) -> Self {
        Self { ids, directory }
    }

    /// Create one successor per (core-distribution egress payload, matching
    /// subscriber) and record each in `task`'s completion summary.
    ///
    /// `origin` scopes the successors' sequence numbers. When nothing
    /// matches, the parent is marked last-in-chain and finalised.
    pub fn collect_outcomes_and_create_new_tasks(
        &self,
        task: &mut Task,
        origin: &ParticipantName,
    ) -> Propagation {
        let registrations = self.directory.registrations();
        let mut propagation = Propagation::default();
        let parent_id = task.id();
        let mut journey = task.journey.clone();
        journey.push(parent_id);

        let parent_origin = task.work_item.ingress.manifest.origin.clone();

        let summary = task.completion.get_or_insert_with(CompletionSummary::default);

        for (index, payload) in task.work_item.egress.iter().enumerate() {
            if !payload.manifest.is_core_distribution() {
                continue;
            }
            let mut payload = payload.clone();
            if payload.manifest.origin.is_none() {
                payload.manifest.origin = parent_origin.clone();
            }
            if let Err(e) = payload.manifest.validate() {
                tracing::warn!(task_id = %parent_id, index, error = %e, "skipping egress payload");
                propagation.skipped += 1;
                continue;
            }
            for subscriber in matcher::subscribers(&payload.manifest, &registrations) {
                let mut successor = Task::new(self.ids.next_task_id(origin), payload.clone());
                successor.performers = PerformerRequirement::participant(subscriber.clone());
                successor.journey = journey.clone();
                summary.downstream.insert(successor.id(), subscriber);
                propagation.downstream.push(successor);
            }
        }

        if summary.downstream.is_empty() {
            summary.last_in_chain = true;
            summary.finalised = true;
            propagation.last_in_chain = true;
        }

        tracing::info!(
            task_id = %parent_id,
            downstream = propagation.downstream.len(),
            skipped = propagation.skipped,
            last_in_chain = propagation.last_in_chain,
            "propagated task outcomes"
        );
        propagation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        FlowDirection, Manifest, ParticipantFilter, ParticipantRef, ParticipantRegistration, Payload,
        Subscription, TaskId,
    };
    use crate::impls::InMemoryParticipantRegistry;
    use crate::ports::{SystemClock, UlidGenerator};

    fn propagator(regs: Vec<ParticipantRegistration>) -> TaskChainPropagator {
        let directory = InMemoryParticipantRegistry::new();
        for r in regs {
            directory.upsert(r);
        }
        TaskChainPropagator::new(
            Arc::new(UlidGenerator::new(Arc::new(SystemClock))),
            Arc::new(directory),
        )
    }

    fn parent() -> Task {
        Task::new(
            TaskId::from_parts(1, 1),
            Payload::new(Manifest::core("Order"), serde_json::json!({"order": 7})),
        )
    }

    fn egress(container: &str, content: &str) -> Payload {
        Payload::new(
            Manifest::core(container).with_content(content),
            serde_json::json!({"doc": content}),
        )
    }

    #[test]
    fn order_invoice_reaches_billing() {
        let p = propagator(vec![ParticipantRegistration::new(
            "Billing",
            vec![Subscription::to_container("Order")],
        )]);
        let mut task = parent().with_egress(egress("Order", "Invoice"));

        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));

        assert_eq!(out.downstream.len(), 1);
        let child = &out.downstream[0];
        assert!(child.is_targeted_at(&ParticipantName::new("Billing")));
        assert_eq!(child.work_item.ingress, task.work_item.egress[0]);
        assert_eq!(child.journey, vec![task.id()]);

        let summary = task.completion.as_ref().unwrap();
        assert!(summary.downstream.contains_key(&child.id()));
        assert!(!summary.last_in_chain);
        assert!(!summary.finalised);
    }

    #[test]
    fn downstream_count_is_sum_over_payloads() {
        let p = propagator(vec![
            ParticipantRegistration::new("Billing", vec![Subscription::to_container("Order")]),
            ParticipantRegistration::new(
                "Archive",
                vec![Subscription::to_container("Order"), Subscription::to_container("Shipment")],
            ),
            ParticipantRegistration::new("Dispatch", vec![Subscription::to_container("Shipment")]),
        ]);
        let mut task = parent()
            .with_egress(egress("Order", "Invoice"))
            .with_egress(egress("Shipment", "Label"))
            .with_egress(egress("Catalog", "Item"));

        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));

        // Order -> Billing + Archive, Shipment -> Archive + Dispatch, Catalog -> nobody
        assert_eq!(out.downstream.len(), 4);
        assert_eq!(task.completion.unwrap().downstream.len(), 4);
    }

    #[test]
    fn no_subscriber_marks_last_in_chain() {
        let p = propagator(vec![]);
        let mut task = parent().with_egress(egress("Order", "Invoice"));
        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));
        assert!(out.downstream.is_empty());
        assert!(out.last_in_chain);
        let summary = task.completion.unwrap();
        assert!(summary.last_in_chain);
        assert!(summary.finalised);
    }

    #[test]
    fn malformed_payload_does_not_stop_siblings() {
        let p = propagator(vec![ParticipantRegistration::new(
            "Billing",
            vec![Subscription::to_container("Order")],
        )]);
        let mut task = parent()
            .with_egress(egress("Order", "*"))
            .with_egress(egress("Order", "Invoice"));

        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));
        assert_eq!(out.skipped, 1);
        assert_eq!(out.downstream.len(), 1);
    }

    #[test]
    fn non_core_payloads_are_not_fanned_out() {
        let p = propagator(vec![ParticipantRegistration::new(
            "Billing",
            vec![Subscription::wildcard()],
        )]);
        let mut task = parent().with_egress(Payload::new(
            Manifest::core("Order").with_direction(FlowDirection::Export),
            serde_json::Value::Null,
        ));
        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));
        assert!(out.downstream.is_empty());
        assert!(out.last_in_chain);
    }

    #[test]
    fn origin_is_inherited_from_parent() {
        let p = propagator(vec![ParticipantRegistration::new(
            "Billing",
            vec![Subscription::to_container("Order")
                .with_origin(Some(ParticipantFilter::new("Intake", "*", "*")))],
        )]);
        let intake = ParticipantRef::new("Intake", "orders", "1");
        let mut task = Task::new(
            TaskId::from_parts(1, 1),
            Payload::new(
                Manifest::core("Order").with_origin(intake.clone()),
                serde_json::Value::Null,
            ),
        )
        .with_egress(egress("Order", "Invoice"));

        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));
        assert_eq!(out.downstream.len(), 1);
        assert_eq!(out.downstream[0].work_item.ingress.manifest.origin, Some(intake));
    }

    #[test]
    fn journey_extends_parent_journey() {
        let p = propagator(vec![ParticipantRegistration::new(
            "Billing",
            vec![Subscription::to_container("Order")],
        )]);
        let grandparent = TaskId::from_parts(100, 1);
        let mut task = parent().with_egress(egress("Order", "Invoice"));
        task.journey = vec![grandparent];
        let out = p.collect_outcomes_and_create_new_tasks(&mut task, &ParticipantName::new("Intake"));
        assert_eq!(out.downstream[0].journey, vec![grandparent, task.id()]);
    }
}
