//! Lifecycle Manager: participant callbacks that move a task through
//! its fulfillment statuses.
//!
//! Design:
//! - Every callback answers with an `ExecutionControl`; nothing here returns
//!   an error to the participant. Bad input, unknown tasks and illegal
//!   transitions all come back as `Cancel` and leave the store untouched.
//! - The transition itself runs under the task's store lock. The follow-up
//!   persistence write is awaited after the lock is gone.
//! - `finalise` propagates first and then drops the task from the cache.
//!   Registering the successors is the grid's job.

mod persister;

pub use persister::{Persister, WriteKind};

use std::sync::Arc;

use crate::chain::{Propagation, TaskChainPropagator};
use crate::domain::{
    CompletionSummary, ExecutionControl, FulfillmentStatus, JobCard, OutcomeStatus,
    ParticipantName, Payload, StorageStatus, Task, TaskId,
};
use crate::queue::ParticipantQueues;
use crate::store::{FulfillerRef, TaskStore, apply_status};

/// Result of `finalise`: the directive plus the successor tasks to register.
#[derive(Debug, Clone)]
pub struct Finalisation {
    pub control: ExecutionControl,
    pub downstream: Vec<Task>,
}

impl Finalisation {
    fn cancelled() -> Self {
        Self {
            control: ExecutionControl::Cancel,
            downstream: Vec::new(),
        }
    }
}

struct Transition {
    to: FulfillmentStatus,
    outcome: Option<OutcomeStatus>,
    egress: Vec<Payload>,
    control: ExecutionControl,
}

pub struct LifecycleManager {
    store: Arc<TaskStore>,
    queues: Arc<ParticipantQueues>,
    persister: Arc<Persister>,
    propagator: TaskChainPropagator,
}

impl LifecycleManager {
    pub fn new(
        store: Arc<TaskStore>,
        queues: Arc<ParticipantQueues>,
        persister: Arc<Persister>,
        propagator: TaskChainPropagator,
    ) -> Self {
        Self {
            store,
            queues,
            persister,
            propagator,
        }
    }

    pub async fn start(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::Active,
                outcome: None,
                egress: Vec::new(),
                control: ExecutionControl::Execute,
            },
        )
        .await
    }

    /// Park a registered task until a performer can take it.
    pub async fn wait(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::Waiting,
                outcome: None,
                egress: Vec::new(),
                control: ExecutionControl::Wait,
            },
        )
        .await
    }

    /// Record success. A non-empty `egress` replaces the task's egress payloads.
    pub async fn finish(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
        egress: Vec<Payload>,
    ) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::Finished,
                outcome: Some(OutcomeStatus::Success),
                egress,
                control: ExecutionControl::Finish,
            },
        )
        .await
    }

    pub async fn fail(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::Failed,
                outcome: Some(OutcomeStatus::Failure),
                egress: Vec::new(),
                control: ExecutionControl::Fail,
            },
        )
        .await
    }

    pub async fn cancel(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::Cancelled,
                outcome: Some(OutcomeStatus::Cancelled),
                egress: Vec::new(),
                control: ExecutionControl::Cancel,
            },
        )
        .await
    }

    /// The participant looked at the task and found nothing to do.
    pub async fn no_action_required(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
    ) -> ExecutionControl {
        self.transition(
            participant,
            task_id,
            Transition {
                to: FulfillmentStatus::NoActionRequired,
                outcome: Some(OutcomeStatus::NoActionRequired),
                egress: Vec::new(),
                control: ExecutionControl::Finish,
            },
        )
        .await
    }

    /// Close a terminal task.
    ///
    /// Finished tasks are propagated to their subscribers; other terminal
    /// outcomes end the chain. The final record is persisted and the task
    /// leaves the cache. If that write fails the task stays cached as
    /// `Finalised` until the maintenance sweep has persisted it.
    pub async fn finalise(&self, participant: &ParticipantName, task_id: TaskId) -> Finalisation {
        if participant.is_blank() {
            tracing::debug!(task_id = %task_id, "finalise without participant");
            return Finalisation::cancelled();
        }
        let at = self.store.now();
        let applied = self.store.try_modify(task_id, |task| {
            let from = task.status();
            if !from.is_terminal() {
                return Err(from);
            }
            let propagation = if from == FulfillmentStatus::Finished {
                self.propagator
                    .collect_outcomes_and_create_new_tasks(task, participant)
            } else {
                end_of_chain(task)
            };
            apply_status(task, FulfillmentStatus::Finalised, at);
            Ok((task.clone(), propagation))
        });

        let (task, propagation) = match applied {
            None => {
                tracing::debug!(task_id = %task_id, participant = %participant, "finalise on unknown task");
                return Finalisation::cancelled();
            }
            Some(Err(from)) => {
                tracing::warn!(
                    task_id = %task_id,
                    participant = %participant,
                    from = ?from,
                    "finalise rejected: task is not terminal"
                );
                return Finalisation::cancelled();
            }
            Some(Ok(done)) => done,
        };

        self.queues.remove_everywhere(task_id);
        let provenance = self.persister.write(&task, WriteKind::Update).await;
        if provenance.status == StorageStatus::Persisted {
            self.store.archive(task_id);
        }
        tracing::debug!(
            task_id = %task_id,
            participant = %participant,
            downstream = propagation.downstream.len(),
            "task finalised"
        );
        Finalisation {
            control: ExecutionControl::CleanUp,
            downstream: propagation.downstream,
        }
    }

    /// Next command for `participant` given the task's current status.
    pub fn negotiate(&self, participant: &ParticipantName, task_id: TaskId) -> JobCard {
        let card = |status, control| JobCard {
            task_id,
            participant: participant.clone(),
            status,
            control,
        };
        if participant.is_blank() {
            return card(FulfillmentStatus::Unregistered, ExecutionControl::Cancel);
        }
        let Some(task) = self.store.get(task_id) else {
            // Offloaded bodies are still registered; the participant just waits.
            return if self.store.is_registered(task_id) {
                card(FulfillmentStatus::Registered, ExecutionControl::Wait)
            } else {
                card(FulfillmentStatus::Unregistered, ExecutionControl::Cancel)
            };
        };
        let status = task.status();
        let control = match status {
            FulfillmentStatus::Registered | FulfillmentStatus::Active
                if task.is_targeted_at(participant) =>
            {
                ExecutionControl::Execute
            }
            FulfillmentStatus::Registered
            | FulfillmentStatus::Active
            | FulfillmentStatus::Waiting => ExecutionControl::Wait,
            FulfillmentStatus::Finished | FulfillmentStatus::NoActionRequired => {
                ExecutionControl::Finish
            }
            FulfillmentStatus::Failed => ExecutionControl::Fail,
            FulfillmentStatus::Finalised => ExecutionControl::CleanUp,
            FulfillmentStatus::Cancelled | FulfillmentStatus::Unregistered => {
                ExecutionControl::Cancel
            }
        };
        card(status, control)
    }

    async fn transition(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
        step: Transition,
    ) -> ExecutionControl {
        let Transition {
            to,
            outcome,
            egress,
            control,
        } = step;
        if participant.is_blank() {
            tracing::debug!(task_id = %task_id, to = ?to, "callback without participant");
            return ExecutionControl::Cancel;
        }
        let at = self.store.now();
        let applied = self.store.try_modify(task_id, |task| {
            let from = task.status();
            if !from.can_advance_to(to) {
                return Err(from);
            }
            apply_status(task, to, at);
            if let Some(outcome) = outcome {
                task.outcome = Some(outcome);
            }
            if !egress.is_empty() {
                task.work_item.egress = egress;
            }
            Ok(task.clone())
        });

        let task = match applied {
            None => {
                tracing::debug!(task_id = %task_id, participant = %participant, to = ?to, "callback on unknown task");
                return ExecutionControl::Cancel;
            }
            Some(Err(from)) => {
                tracing::warn!(
                    task_id = %task_id,
                    participant = %participant,
                    from = ?from,
                    to = ?to,
                    "illegal transition"
                );
                return ExecutionControl::Cancel;
            }
            Some(Ok(task)) => task,
        };

        self.store
            .add_fulfiller(task_id, &FulfillerRef::participant(participant.clone()));
        self.persister.write(&task, WriteKind::Update).await;
        tracing::debug!(task_id = %task_id, participant = %participant, to = ?to, "transition applied");
        control
    }
}

// Failed, cancelled and no-action tasks produce no successors.
fn end_of_chain(task: &mut Task) -> Propagation {
    let summary = task
        .completion
        .get_or_insert_with(CompletionSummary::default);
    summary.last_in_chain = true;
    summary.finalised = true;
    Propagation {
        last_in_chain: true,
        ..Propagation::default()
    }
}
