//! Grid - the owning facade producers and participants talk to.
//!
//! One `Grid` per node holds every cache and collaborator; there is no
//! process-global state. Sync cache work and async persistence are kept
//! apart: a lock is never held across an `.await`.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::chain::TaskChainPropagator;
use crate::config::GridConfig;
use crate::domain::{
    ExecutionControl, JobCard, ParticipantName, Payload, QueueEntry, StorageStatus, Task, TaskId,
};
use crate::error::GridError;
use crate::lifecycle::{LifecycleManager, Persister, WriteKind};
use crate::matcher;
use crate::ports::{Clock, IdGenerator, ParticipantDirectory, Persistence, SystemClock, UlidGenerator};
use crate::queue::ParticipantQueues;
use crate::store::{FulfillerRef, StoreCounts, TaskStore, identity_for};

/// Acknowledgement handed to a producer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registered {
    pub task_id: TaskId,
    /// `NotYetPersisted` when the durable write failed; the grid retries it.
    pub persistence: StorageStatus,
    /// Participants whose queue now holds the task.
    pub targets: BTreeSet<ParticipantName>,
}

/// Cache sizes across the store and all queues.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCounts {
    pub store: StoreCounts,
    pub queued: usize,
    pub offloaded: usize,
    pub participants: usize,
}

// What `accept` does when a target queue stays full after offloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Overflow {
    /// Report `QueueFull` to the producer.
    Reject,
    /// Keep the entry in the offloaded tier.
    Park,
}

pub struct Grid {
    config: GridConfig,
    store: Arc<TaskStore>,
    queues: Arc<ParticipantQueues>,
    directory: Arc<dyn ParticipantDirectory>,
    ids: Arc<dyn IdGenerator>,
    persister: Arc<Persister>,
    lifecycle: LifecycleManager,
}

impl Grid {
    /// Grid on the system clock with ULID ids.
    pub fn new(
        config: GridConfig,
        directory: Arc<dyn ParticipantDirectory>,
        persistence: Arc<dyn Persistence>,
    ) -> Result<Self, GridError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let ids = Arc::new(UlidGenerator::new(clock.clone()));
        Self::with_parts(config, directory, persistence, clock, ids)
    }

    pub fn with_parts(
        config: GridConfig,
        directory: Arc<dyn ParticipantDirectory>,
        persistence: Arc<dyn Persistence>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Result<Self, GridError> {
        config.validate()?;
        let store = Arc::new(TaskStore::local(
            identity_for(config.fulfiller_identity),
            clock,
            config.lock_shards,
        ));
        let queues = Arc::new(ParticipantQueues::new(
            config.max_queue_size,
            config.onload_threshold,
        ));
        let persister = Arc::new(Persister::new(
            persistence,
            store.clone(),
            config.persistence_timeout(),
        ));
        let propagator = TaskChainPropagator::new(ids.clone(), directory.clone());
        let lifecycle =
            LifecycleManager::new(store.clone(), queues.clone(), persister.clone(), propagator);
        Ok(Self {
            config,
            store,
            queues,
            directory,
            ids,
            persister,
            lifecycle,
        })
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn queues(&self) -> &ParticipantQueues {
        &self.queues
    }

    /// Allocate an id for a task `origin` is about to register.
    pub fn new_task_id(&self, origin: &ParticipantName) -> TaskId {
        self.ids.next_task_id(origin)
    }

    /// Register a task on behalf of `participant` and queue it for its
    /// performers.
    ///
    /// Explicit performers are used as-is; otherwise the ingress manifest is
    /// matched against current subscriptions and the subscribers become the
    /// performers. Re-registering the same id is idempotent.
    pub async fn register(
        &self,
        participant: &ParticipantName,
        task: Task,
    ) -> Result<Registered, GridError> {
        self.accept(participant, task, Overflow::Reject).await
    }

    async fn accept(
        &self,
        participant: &ParticipantName,
        mut task: Task,
        overflow: Overflow,
    ) -> Result<Registered, GridError> {
        if participant.is_blank() {
            return Err(GridError::InvalidArgument("participant name is empty".into()));
        }
        task.work_item.ingress.manifest.validate()?;

        let targets: BTreeSet<ParticipantName> = if task.performers.participants.is_empty() {
            matcher::subscribers(&task.work_item.ingress.manifest, &self.directory.registrations())
        } else {
            task.performers.participants.clone()
        };
        task.performers.participants.extend(targets.iter().cloned());

        let registration = self
            .store
            .register(task, &FulfillerRef::participant(participant.clone()));
        let task_id = registration.task_id;
        let Some(stored) = self.store.get(task_id) else {
            return Err(GridError::NotFound(task_id));
        };

        let provenance = self.persister.write(&stored, WriteKind::Save).await;

        let mut first_error = None;
        for target in &targets {
            let entry = QueueEntry::cached(task_id, self.config.node_name.as_str(), self.store.now())
                .with_persistence(provenance.clone());
            match self.enqueue(target, entry.clone()).await {
                Ok(_) => {}
                Err(GridError::QueueFull { .. }) if overflow == Overflow::Park => {
                    self.queues.requeue(target, entry, self.store.now());
                    tracing::warn!(task_id = %task_id, participant = %target, "queue full, task parked offloaded");
                }
                Err(e) => {
                    tracing::warn!(task_id = %task_id, participant = %target, error = %e, "task not queued");
                    first_error.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }
        if targets.is_empty() {
            tracing::info!(task_id = %task_id, "no subscriber for task");
        }

        tracing::debug!(
            task_id = %task_id,
            participant = %participant,
            targets = targets.len(),
            persistence = ?provenance.status,
            "task accepted"
        );
        Ok(Registered {
            task_id,
            persistence: provenance.status,
            targets,
        })
    }

    /// Next task for `participant` in sequence order, or `None` when its
    /// queue (including offloaded entries) is empty.
    ///
    /// Entries whose task has since been evicted or archived are skipped.
    pub async fn next_pending_task(
        &self,
        participant: &ParticipantName,
    ) -> Result<Option<Task>, GridError> {
        loop {
            if self.queues.size(participant) == 0 {
                self.queues
                    .onload(participant, self.config.offload_batch, self.store.now());
            }
            // 先頭は両 tier 通して最小 sequence。offload 済みなら本体は persistence から戻す
            let Some(entry) = self.queues.poll(participant) else {
                return Ok(None);
            };
            let task_id = entry.task_id;
            if let Some(task) = self.store.get(task_id) {
                return Ok(Some(task));
            }
            if !self.store.is_registered(task_id) {
                tracing::debug!(task_id = %task_id, participant = %participant, "dropping stale entry");
                continue;
            }
            match self.persister.load(task_id).await {
                Ok(Some(task)) => {
                    self.store.restore(task.clone());
                    return Ok(Some(task));
                }
                Ok(None) => {
                    tracing::warn!(task_id = %task_id, "offloaded task missing from persistence");
                    continue;
                }
                Err(e) => {
                    // Put it back so the next poll sees it first.
                    self.queues.requeue(participant, entry, self.store.now());
                    return Err(e);
                }
            }
        }
    }

    pub async fn start(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.lifecycle.start(participant, task_id).await
    }

    pub async fn wait(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.lifecycle.wait(participant, task_id).await
    }

    pub async fn finish(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
        egress: Vec<Payload>,
    ) -> ExecutionControl {
        self.lifecycle.finish(participant, task_id, egress).await
    }

    pub async fn fail(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.lifecycle.fail(participant, task_id).await
    }

    pub async fn cancel(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        self.lifecycle.cancel(participant, task_id).await
    }

    pub async fn no_action_required(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
    ) -> ExecutionControl {
        self.lifecycle.no_action_required(participant, task_id).await
    }

    /// Finalise a terminal task and register every successor it produced.
    ///
    /// A successor whose target queue is full is parked in the offloaded
    /// tier rather than refused; nobody is left to retry it.
    pub async fn finalise(&self, participant: &ParticipantName, task_id: TaskId) -> ExecutionControl {
        let finalisation = self.lifecycle.finalise(participant, task_id).await;
        for successor in finalisation.downstream {
            let successor_id = successor.id();
            if let Err(e) = self.accept(participant, successor, Overflow::Park).await {
                tracing::warn!(
                    task_id = %task_id,
                    successor = %successor_id,
                    error = %e,
                    "successor registration failed"
                );
            }
        }
        finalisation.control
    }

    pub fn negotiate(&self, participant: &ParticipantName, task_id: TaskId) -> JobCard {
        self.lifecycle.negotiate(participant, task_id)
    }

    /// Forget offloaded entries `participant` already buffers; returns the
    /// ids it still has to fetch.
    pub fn synchronise(
        &self,
        participant: &ParticipantName,
        known_buffered: &BTreeSet<TaskId>,
    ) -> BTreeSet<TaskId> {
        self.queues.synchronise(participant, known_buffered)
    }

    /// Evict aged registrations and their queue entries.
    pub fn evict_aged(&self) -> BTreeSet<TaskId> {
        let evicted = self.store.evict_older_than(self.config.eviction_threshold());
        for task_id in &evicted {
            self.queues.remove_everywhere(*task_id);
        }
        evicted
    }

    /// Retry persistence writes that failed earlier and refresh the
    /// provenance on queued entries. Returns how many writes landed.
    pub async fn retry_pending_persistence(&self) -> usize {
        let landed = self.persister.retry_pending().await;
        let participants = self.queues.participants();
        for (task_id, provenance) in &landed {
            for participant in &participants {
                self.queues
                    .mark_persisted(participant, *task_id, provenance.clone());
            }
        }
        landed.len()
    }

    pub fn counts(&self) -> GridCounts {
        GridCounts {
            store: self.store.counts(),
            queued: self.queues.total_size(),
            offloaded: self.queues.total_offloaded(),
            participants: self.queues.participants().len(),
        }
    }

    // Enqueue, making room by offloading once if the queue is full.
    async fn enqueue(&self, participant: &ParticipantName, entry: QueueEntry) -> Result<bool, GridError> {
        match self.queues.enqueue(participant, entry.clone()) {
            Err(GridError::QueueFull { .. }) => {
                let demoted = self.offload(participant).await;
                tracing::warn!(participant = %participant, demoted, "queue full, offloaded entries");
                self.queues.enqueue(participant, entry)
            }
            other => other,
        }
    }

    /// Demote the oldest entries beyond the onload threshold. Bodies are
    /// dropped from the cache only once persistence holds them.
    async fn offload(&self, participant: &ParticipantName) -> usize {
        let demoted = self
            .queues
            .offload(participant, self.config.offload_batch, self.store.now());
        for entry in &demoted {
            let Some(task) = self.store.get(entry.task_id) else {
                continue;
            };
            match self.persister.write_raw(&task, WriteKind::Update).await {
                Ok(_) => {
                    self.store.demote(entry.task_id);
                }
                Err(e) => {
                    tracing::warn!(task_id = %entry.task_id, error = %e, "offloaded body kept in cache");
                }
            }
        }
        demoted.len()
    }
}
