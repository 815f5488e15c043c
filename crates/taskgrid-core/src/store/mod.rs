//! Task Store: authoritative in-memory record of every in-flight task.
//!
//! Design:
//! - Task bodies, registrations and per-task persistence provenance live in
//!   three `ReplicatedMap`s keyed by `TaskId`.
//! - Every read-modify-write on one task id runs under that id's shard of
//!   the lock table; different ids proceed in parallel.
//! - Nothing here awaits. Persistence is the caller's job, after the lock
//!   has been released.

mod effects;
mod fulfiller;
mod lock_table;

pub use effects::apply_status;
pub use fulfiller::{ByComponent, ByParticipant, FulfillerIdentity, FulfillerRef, identity_for};
pub use lock_table::LockTable;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    FulfillmentStatus, OutcomeStatus, StorageProvenance, StorageStatus, Task, TaskId,
    TaskRegistration,
};
use crate::error::GridError;
use crate::impls::LocalReplicatedMap;
use crate::ports::{Clock, ReplicatedMap};

/// Cache sizes reported by the maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub tasks: usize,
    pub registrations: usize,
    pub registered: usize,
    pub waiting: usize,
    pub active: usize,
    pub terminal: usize,
    pub pending_persistence: usize,
}

pub struct TaskStore {
    tasks: Arc<dyn ReplicatedMap<TaskId, Task>>,
    registrations: Arc<dyn ReplicatedMap<TaskId, TaskRegistration>>,
    persistence: Arc<dyn ReplicatedMap<TaskId, StorageProvenance>>,
    locks: LockTable,
    identity: Box<dyn FulfillerIdentity>,
    clock: Arc<dyn Clock>,
}

impl TaskStore {
    /// Store backed by single-node maps.
    pub fn local(
        identity: Box<dyn FulfillerIdentity>,
        clock: Arc<dyn Clock>,
        lock_shards: usize,
    ) -> Self {
        Self::with_maps(
            Arc::new(LocalReplicatedMap::new()),
            Arc::new(LocalReplicatedMap::new()),
            Arc::new(LocalReplicatedMap::new()),
            identity,
            clock,
            lock_shards,
        )
    }

    /// Store backed by caller-provided (possibly replicated) maps.
    pub fn with_maps(
        tasks: Arc<dyn ReplicatedMap<TaskId, Task>>,
        registrations: Arc<dyn ReplicatedMap<TaskId, TaskRegistration>>,
        persistence: Arc<dyn ReplicatedMap<TaskId, StorageProvenance>>,
        identity: Box<dyn FulfillerIdentity>,
        clock: Arc<dyn Clock>,
        lock_shards: usize,
    ) -> Self {
        Self {
            tasks,
            registrations,
            persistence,
            locks: LockTable::new(lock_shards),
            identity,
            clock,
        }
    }

    /// Register a task, or merge into the existing registration for its id.
    ///
    /// A repeated registration never duplicates: performer and fulfiller
    /// sets are unioned and the stored lifecycle state is kept.
    pub fn register(&self, task: Task, fulfiller: &FulfillerRef) -> TaskRegistration {
        let now = self.clock.now();
        let id = task.id();
        let fulfiller_id = self.identity.identify(fulfiller);

        let _guard = self.locks.lock(&id);
        let stored = match self.tasks.get(&id) {
            Some(mut existing) => {
                existing.performers.merge(&task.performers);
                existing
            }
            None => {
                let mut fresh = task;
                apply_status(&mut fresh, FulfillmentStatus::Registered, now);
                fresh
            }
        };
        let mut registration = self
            .registrations
            .get(&id)
            .unwrap_or_else(|| TaskRegistration::new(id, now));
        registration.checked_at = now;
        registration.fulfillers.insert(fulfiller_id);
        registration
            .performer_types
            .extend(stored.performers.performer_types());

        self.tasks.put(id, stored);
        self.registrations.put(id, registration.clone());
        tracing::debug!(task_id = %id, "task registered");
        registration
    }

    /// Replace the stored body of a known task.
    ///
    /// Fails with `NotFound` for unknown ids and `InvalidArgument` when the
    /// new body would regress the fulfillment status.
    pub fn update(&self, task: Task) -> Result<TaskRegistration, GridError> {
        let id = task.id();
        let now = self.clock.now();

        let _guard = self.locks.lock(&id);
        let stored = self.tasks.get(&id).ok_or(GridError::NotFound(id))?;
        if !stored.status().can_advance_to(task.status()) {
            return Err(GridError::InvalidArgument(format!(
                "{id}: status {:?} cannot follow {:?}",
                task.status(),
                stored.status()
            )));
        }
        self.tasks.replace(&id, task);
        Ok(self.touch(id, now))
    }

    pub fn get(&self, task_id: TaskId) -> Option<Task> {
        self.tasks.get(&task_id)
    }

    pub fn registration(&self, task_id: TaskId) -> Option<TaskRegistration> {
        self.registrations.get(&task_id)
    }

    /// Whether the store knows the id, including tasks whose body was offloaded.
    pub fn is_registered(&self, task_id: TaskId) -> bool {
        self.registrations.contains_key(&task_id)
    }

    /// Apply an outcome and/or fulfillment status with its side effects.
    ///
    /// Unknown ids yield `None` and leave the store untouched. A regressing
    /// status is ignored; the outcome is still recorded.
    pub fn set_status(
        &self,
        task_id: TaskId,
        outcome: Option<OutcomeStatus>,
        status: Option<FulfillmentStatus>,
        at: DateTime<Utc>,
    ) -> Option<Task> {
        self.modify(task_id, |task| {
            if let Some(status) = status
                && !apply_status(task, status, at)
            {
                tracing::debug!(
                    task_id = %task_id,
                    from = ?task.status(),
                    to = ?status,
                    "ignored regressing status"
                );
            }
            if let Some(outcome) = outcome {
                task.outcome = Some(outcome);
            }
            task.clone()
        })
    }

    /// Run `f` against the stored task under its lock and write the result back.
    pub fn modify<R>(&self, task_id: TaskId, f: impl FnOnce(&mut Task) -> R) -> Option<R> {
        self.try_modify(task_id, |task| Ok::<R, std::convert::Infallible>(f(task)))
            .map(|out| match out {
                Ok(r) => r,
                Err(never) => match never {},
            })
    }

    /// Like `modify`, but nothing is written back when `f` returns `Err`.
    pub fn try_modify<R, E>(
        &self,
        task_id: TaskId,
        f: impl FnOnce(&mut Task) -> Result<R, E>,
    ) -> Option<Result<R, E>> {
        let now = self.clock.now();
        let _guard = self.locks.lock(&task_id);
        let mut task = self.tasks.get(&task_id)?;
        let out = f(&mut task);
        if out.is_ok() {
            self.tasks.replace(&task_id, task);
            self.touch(task_id, now);
        }
        Some(out)
    }

    /// Record a fulfiller against an existing registration.
    pub fn add_fulfiller(&self, task_id: TaskId, fulfiller: &FulfillerRef) -> bool {
        let now = self.clock.now();
        let fulfiller_id = self.identity.identify(fulfiller);
        let _guard = self.locks.lock(&task_id);
        let Some(mut registration) = self.registrations.get(&task_id) else {
            return false;
        };
        registration.fulfillers.insert(fulfiller_id);
        registration.checked_at = now;
        self.registrations.replace(&task_id, registration);
        true
    }

    /// Remove a task and everything kept about it. The terminal record now
    /// lives only in persistence.
    pub fn archive(&self, task_id: TaskId) -> Option<Task> {
        let _guard = self.locks.lock(&task_id);
        self.remove_all(task_id)
    }

    /// Drop the body of a task from memory while keeping its registration.
    /// Used when its queue entry is offloaded.
    pub fn demote(&self, task_id: TaskId) -> Option<Task> {
        let _guard = self.locks.lock(&task_id);
        self.tasks.remove(&task_id)
    }

    /// Put a body loaded back from persistence into the cache, unless the
    /// registration is gone or a newer body is already cached.
    pub fn restore(&self, task: Task) -> bool {
        let id = task.id();
        let _guard = self.locks.lock(&id);
        if !self.registrations.contains_key(&id) || self.tasks.contains_key(&id) {
            return false;
        }
        self.tasks.put(id, task);
        true
    }

    /// Remove every registration older than `threshold`, with its body and
    /// auxiliary records, one task at a time under that task's lock.
    ///
    /// A task whose last write is still `NotYetPersisted` stays cached until
    /// a retry lands; the cache holds its only copy.
    pub fn evict_older_than(&self, threshold: Duration) -> BTreeSet<TaskId> {
        let now = self.clock.now();
        let threshold_secs = threshold.as_secs() as i64;
        let mut evicted = BTreeSet::new();
        let mut held = 0usize;
        for task_id in self.registrations.keys() {
            let _guard = self.locks.lock(&task_id);
            // Re-read under the lock; a concurrent touch may have replaced it.
            let Some(registration) = self.registrations.get(&task_id) else {
                continue;
            };
            if registration.age_secs(now) <= threshold_secs {
                continue;
            }
            let unpersisted = self
                .persistence
                .get(&task_id)
                .is_some_and(|p| p.status == StorageStatus::NotYetPersisted);
            if unpersisted {
                held += 1;
            } else {
                self.remove_all(task_id);
                evicted.insert(task_id);
            }
        }
        if held > 0 {
            tracing::warn!(count = held, "aged registrations held until persisted");
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "evicted aged registrations");
        }
        evicted
    }

    pub fn set_persistence(&self, task_id: TaskId, provenance: StorageProvenance) {
        let _guard = self.locks.lock(&task_id);
        if self.registrations.contains_key(&task_id) {
            self.persistence.put(task_id, provenance);
        }
    }

    pub fn persistence_of(&self, task_id: TaskId) -> Option<StorageProvenance> {
        self.persistence.get(&task_id)
    }

    /// Tasks whose last persistence write has not succeeded.
    pub fn pending_persistence(&self) -> Vec<TaskId> {
        self.persistence
            .keys()
            .into_iter()
            .filter(|id| {
                self.persistence
                    .get(id)
                    .is_some_and(|p| p.status == StorageStatus::NotYetPersisted)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn counts(&self) -> StoreCounts {
        let mut counts = StoreCounts {
            tasks: self.tasks.len(),
            registrations: self.registrations.len(),
            pending_persistence: self.pending_persistence().len(),
            ..StoreCounts::default()
        };
        for id in self.tasks.keys() {
            let Some(task) = self.tasks.get(&id) else {
                continue;
            };
            match task.status() {
                FulfillmentStatus::Registered => counts.registered += 1,
                FulfillmentStatus::Waiting => counts.waiting += 1,
                FulfillmentStatus::Active => counts.active += 1,
                s if s.is_terminal() => counts.terminal += 1,
                _ => {}
            }
        }
        counts
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn touch(&self, task_id: TaskId, now: DateTime<Utc>) -> TaskRegistration {
        let mut registration = self
            .registrations
            .get(&task_id)
            .unwrap_or_else(|| TaskRegistration::new(task_id, now));
        registration.checked_at = now;
        self.registrations.put(task_id, registration.clone());
        registration
    }

    // Caller holds the task's lock.
    fn remove_all(&self, task_id: TaskId) -> Option<Task> {
        self.registrations.remove(&task_id);
        self.persistence.remove(&task_id);
        self.tasks.remove(&task_id)
    }
}
