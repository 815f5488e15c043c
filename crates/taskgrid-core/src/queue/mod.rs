//! Per-participant queues of task pointers.
//!
//! Design:
//! - Each participant owns an independent queue behind its own mutex.
//! - The participant map is a `DashMap`; its entry API is the only place a
//!   queue is created, so creation holds a shard lock briefly and every later
//!   operation uses the participant's lock alone.
//! - Entries are thin `QueueEntry` pointers; task bodies stay in the store.
//! - The queue never drops silently: a full queue is reported as
//!   `GridError::QueueFull` and the caller decides what to do.

mod participant_queue;

pub use participant_queue::ParticipantQueue;

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::domain::{ParticipantName, QueueEntry, StorageProvenance, TaskId};
use crate::error::GridError;

pub struct ParticipantQueues {
    queues: DashMap<ParticipantName, Arc<Mutex<ParticipantQueue>>>,
    max_size: usize,
    onload_threshold: usize,
}

impl ParticipantQueues {
    pub fn new(max_size: usize, onload_threshold: usize) -> Self {
        Self {
            queues: DashMap::new(),
            max_size,
            onload_threshold: onload_threshold.min(max_size),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn onload_threshold(&self) -> usize {
        self.onload_threshold
    }

    /// Queue for `participant`, created on first use.
    fn queue(&self, participant: &ParticipantName) -> Arc<Mutex<ParticipantQueue>> {
        // The entry guard (shard lock) is dropped at the end of this statement.
        self.queues
            .entry(participant.clone())
            .or_insert_with(|| Arc::new(Mutex::new(ParticipantQueue::new())))
            .clone()
    }

    /// Queue for `participant` if it already exists; reads never create one.
    fn existing(&self, participant: &ParticipantName) -> Option<Arc<Mutex<ParticipantQueue>>> {
        self.queues.get(participant).map(|q| q.value().clone())
    }

    /// Insert in sequence order.
    ///
    /// Returns `Ok(false)` when the task is already queued for this
    /// participant (idempotent re-registration) and `QueueFull` when the
    /// in-memory queue is at capacity.
    pub fn enqueue(
        &self,
        participant: &ParticipantName,
        entry: QueueEntry,
    ) -> Result<bool, GridError> {
        if participant.is_blank() {
            return Err(GridError::InvalidArgument("participant name is empty".into()));
        }
        let queue = self.queue(participant);
        let mut q = queue.lock();
        if q.contains(entry.task_id) {
            return Ok(false);
        }
        if q.len() >= self.max_size {
            return Err(GridError::QueueFull {
                participant: participant.clone(),
                max: self.max_size,
            });
        }
        q.insert(entry);
        Ok(true)
    }

    /// Lowest-sequence entry, whether held in memory or offloaded.
    pub fn peek(&self, participant: &ParticipantName) -> Option<QueueEntry> {
        self.existing(participant)?.lock().front().cloned()
    }

    /// Take the lowest-sequence entry. An offloaded head is returned as-is;
    /// the caller reloads its body.
    pub fn poll(&self, participant: &ParticipantName) -> Option<QueueEntry> {
        self.existing(participant)?.lock().pop_front()
    }

    /// Return a polled entry to its queue. Never fails: with no room in
    /// memory the entry is kept in the offloaded tier.
    pub fn requeue(&self, participant: &ParticipantName, entry: QueueEntry, at: DateTime<Utc>) {
        self.queue(participant).lock().requeue(entry, self.max_size, at);
    }

    /// Remove a specific task, whether held in memory or offloaded.
    pub fn remove(&self, participant: &ParticipantName, task_id: TaskId) -> Option<QueueEntry> {
        self.existing(participant)?.lock().remove(task_id)
    }

    /// Remove a task from every participant's queue. Returns how many
    /// entries were dropped.
    pub fn remove_everywhere(&self, task_id: TaskId) -> usize {
        self.snapshot_queues()
            .into_iter()
            .filter(|q| q.lock().remove(task_id).is_some())
            .count()
    }

    /// In-memory size (offloaded entries excluded).
    pub fn size(&self, participant: &ParticipantName) -> usize {
        self.existing(participant).map_or(0, |q| q.lock().len())
    }

    pub fn is_full(&self, participant: &ParticipantName) -> bool {
        self.size(participant) >= self.max_size
    }

    pub fn contains(&self, participant: &ParticipantName, task_id: TaskId) -> bool {
        self.existing(participant)
            .is_some_and(|q| q.lock().contains(task_id))
    }

    pub fn offloaded_len(&self, participant: &ParticipantName) -> usize {
        self.existing(participant)
            .map_or(0, |q| q.lock().offloaded_len())
    }

    /// Demote up to `n` entries beyond the onload threshold.
    ///
    /// Only when the in-memory size exceeds the threshold; the oldest entries
    /// past the threshold go first. Returned entries are marked offloaded and
    /// it is the caller's job to make sure persistence holds them.
    pub fn offload(
        &self,
        participant: &ParticipantName,
        n: usize,
        at: DateTime<Utc>,
    ) -> Vec<QueueEntry> {
        let Some(queue) = self.existing(participant) else {
            return Vec::new();
        };
        let mut q = queue.lock();
        if q.len() <= self.onload_threshold {
            return Vec::new();
        }
        q.offload_beyond(self.onload_threshold, n, at)
    }

    /// Bring up to `n` offloaded entries back while staying within the
    /// onload threshold.
    pub fn onload(
        &self,
        participant: &ParticipantName,
        n: usize,
        at: DateTime<Utc>,
    ) -> Vec<QueueEntry> {
        let Some(queue) = self.existing(participant) else {
            return Vec::new();
        };
        let mut q = queue.lock();
        let room = self.onload_threshold.saturating_sub(q.len()).min(n);
        q.onload(room, at)
    }

    /// Forget offloaded entries the participant has already buffered
    /// locally; returns the ids still only in persistence.
    pub fn synchronise(
        &self,
        participant: &ParticipantName,
        known_buffered: &BTreeSet<TaskId>,
    ) -> BTreeSet<TaskId> {
        match self.existing(participant) {
            Some(queue) => queue.lock().synchronise(known_buffered),
            None => BTreeSet::new(),
        }
    }

    /// Update the persistence provenance of a queued entry.
    pub fn mark_persisted(
        &self,
        participant: &ParticipantName,
        task_id: TaskId,
        provenance: StorageProvenance,
    ) -> bool {
        self.existing(participant)
            .is_some_and(|q| q.lock().set_persistence(task_id, provenance))
    }

    /// Ordered snapshot of the in-memory entries.
    pub fn entries(&self, participant: &ParticipantName) -> Vec<QueueEntry> {
        self.existing(participant)
            .map(|q| q.lock().iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn participants(&self) -> Vec<ParticipantName> {
        let mut names: Vec<_> = self.queues.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Sum of in-memory sizes across participants.
    pub fn total_size(&self) -> usize {
        self.snapshot_queues().iter().map(|q| q.lock().len()).sum()
    }

    pub fn total_offloaded(&self) -> usize {
        self.snapshot_queues()
            .iter()
            .map(|q| q.lock().offloaded_len())
            .sum()
    }

    // Clone the handles first so no participant lock is taken while a map
    // shard is held.
    fn snapshot_queues(&self) -> Vec<Arc<Mutex<ParticipantQueue>>> {
        self.queues.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StorageStatus;

    fn p(name: &str) -> ParticipantName {
        ParticipantName::new(name)
    }

    fn entry(n: u128, seq: u64) -> QueueEntry {
        QueueEntry::cached(TaskId::from_parts(n, seq), "node-a", Utc::now())
    }

    #[test]
    fn poll_is_fifo_by_sequence() {
        let queues = ParticipantQueues::new(10, 10);
        for seq in 1..=5 {
            queues.enqueue(&p("P"), entry(seq as u128, seq)).unwrap();
        }
        let polled: Vec<u64> = std::iter::from_fn(|| queues.poll(&p("P")))
            .map(|e| e.sequence)
            .collect();
        assert_eq!(polled, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn out_of_order_insert_is_sorted() {
        let queues = ParticipantQueues::new(10, 10);
        queues.enqueue(&p("P"), entry(3, 3)).unwrap();
        queues.enqueue(&p("P"), entry(1, 1)).unwrap();
        queues.enqueue(&p("P"), entry(2, 2)).unwrap();
        assert_eq!(queues.peek(&p("P")).unwrap().sequence, 1);
    }

    #[test]
    fn peek_does_not_mutate() {
        let queues = ParticipantQueues::new(10, 10);
        queues.enqueue(&p("P"), entry(1, 1)).unwrap();
        assert!(queues.peek(&p("P")).is_some());
        assert!(queues.peek(&p("P")).is_some());
        assert_eq!(queues.size(&p("P")), 1);
    }

    #[test]
    fn bounded_queue_reports_full_and_keeps_order() {
        let queues = ParticipantQueues::new(2, 2);
        assert!(queues.enqueue(&p("P"), entry(1, 1)).unwrap());
        assert!(queues.enqueue(&p("P"), entry(2, 2)).unwrap());
        assert!(queues.is_full(&p("P")));

        let err = queues.enqueue(&p("P"), entry(3, 3)).unwrap_err();
        assert!(matches!(err, GridError::QueueFull { max: 2, .. }));

        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 1);
        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 2);
        assert!(queues.poll(&p("P")).is_none());
    }

    #[test]
    fn duplicate_enqueue_is_idempotent() {
        let queues = ParticipantQueues::new(5, 5);
        assert!(queues.enqueue(&p("P"), entry(1, 1)).unwrap());
        assert!(!queues.enqueue(&p("P"), entry(1, 1)).unwrap());
        assert_eq!(queues.size(&p("P")), 1);
    }

    #[test]
    fn blank_participant_is_rejected() {
        let queues = ParticipantQueues::new(5, 5);
        let err = queues.enqueue(&p("  "), entry(1, 1)).unwrap_err();
        assert!(matches!(err, GridError::InvalidArgument(_)));
        assert!(queues.participants().is_empty());
    }

    #[test]
    fn reads_do_not_create_queues() {
        let queues = ParticipantQueues::new(5, 5);
        assert!(queues.peek(&p("ghost")).is_none());
        assert_eq!(queues.size(&p("ghost")), 0);
        assert!(queues.participants().is_empty());
    }

    #[test]
    fn remove_specific_task() {
        let queues = ParticipantQueues::new(5, 5);
        queues.enqueue(&p("P"), entry(1, 1)).unwrap();
        queues.enqueue(&p("P"), entry(2, 2)).unwrap();
        let removed = queues.remove(&p("P"), TaskId::from_parts(1, 1)).unwrap();
        assert_eq!(removed.sequence, 1);
        assert_eq!(queues.size(&p("P")), 1);
        assert!(queues.remove(&p("P"), TaskId::from_parts(1, 1)).is_none());
    }

    #[test]
    fn offload_takes_oldest_beyond_threshold() {
        let queues = ParticipantQueues::new(10, 3);
        for seq in 1..=6 {
            queues.enqueue(&p("P"), entry(seq as u128, seq)).unwrap();
        }
        let demoted = queues.offload(&p("P"), 2, Utc::now());
        let seqs: Vec<u64> = demoted.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![4, 5]);
        assert!(demoted.iter().all(|e| e.cache.status == StorageStatus::Offloaded));
        assert_eq!(queues.size(&p("P")), 4);
        assert_eq!(queues.offloaded_len(&p("P")), 2);
        assert!(queues.contains(&p("P"), TaskId::from_parts(4, 4)));
    }

    #[test]
    fn offload_is_noop_under_threshold() {
        let queues = ParticipantQueues::new(10, 3);
        queues.enqueue(&p("P"), entry(1, 1)).unwrap();
        assert!(queues.offload(&p("P"), 5, Utc::now()).is_empty());
    }

    #[test]
    fn onload_restores_in_sequence_order() {
        let queues = ParticipantQueues::new(10, 3);
        for seq in 1..=6 {
            queues.enqueue(&p("P"), entry(seq as u128, seq)).unwrap();
        }
        queues.offload(&p("P"), 3, Utc::now());
        for _ in 0..3 {
            queues.poll(&p("P"));
        }
        let back = queues.onload(&p("P"), 10, Utc::now());
        assert_eq!(back.len(), 3);
        let order: Vec<u64> = queues.entries(&p("P")).iter().map(|e| e.sequence).collect();
        assert_eq!(order, vec![4, 5, 6]);
        assert_eq!(queues.offloaded_len(&p("P")), 0);
    }

    #[test]
    fn poll_serves_offloaded_entries_before_newer_ones() {
        let queues = ParticipantQueues::new(3, 2);
        for seq in 1..=3 {
            queues.enqueue(&p("P"), entry(seq as u128, seq)).unwrap();
        }
        let demoted = queues.offload(&p("P"), 1, Utc::now());
        assert_eq!(demoted[0].sequence, 3);
        queues.enqueue(&p("P"), entry(4, 4)).unwrap();

        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 1);
        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 2);
        let head = queues.peek(&p("P")).unwrap();
        assert_eq!(head.sequence, 3);
        assert_eq!(head.cache.status, StorageStatus::Offloaded);
        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 3);
        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 4);
        assert!(queues.poll(&p("P")).is_none());
    }

    #[test]
    fn requeue_ignores_capacity() {
        let queues = ParticipantQueues::new(2, 2);
        queues.enqueue(&p("P"), entry(1, 1)).unwrap();
        queues.enqueue(&p("P"), entry(2, 2)).unwrap();
        let head = queues.poll(&p("P")).unwrap();
        queues.enqueue(&p("P"), entry(3, 3)).unwrap();
        assert!(queues.is_full(&p("P")));

        queues.requeue(&p("P"), head, Utc::now());
        assert_eq!(queues.size(&p("P")), 2);
        assert_eq!(queues.offloaded_len(&p("P")), 1);
        assert_eq!(queues.poll(&p("P")).unwrap().sequence, 1);
    }

    #[test]
    fn synchronise_drops_locally_buffered_ids() {
        let queues = ParticipantQueues::new(10, 2);
        for seq in 1..=5 {
            queues.enqueue(&p("P"), entry(seq as u128, seq)).unwrap();
        }
        queues.offload(&p("P"), 3, Utc::now());
        let known = BTreeSet::from([TaskId::from_parts(3, 3)]);
        let still = queues.synchronise(&p("P"), &known);
        assert_eq!(
            still,
            BTreeSet::from([TaskId::from_parts(4, 4), TaskId::from_parts(5, 5)])
        );
        assert_eq!(queues.offloaded_len(&p("P")), 2);
    }

    #[test]
    fn queues_are_independent_per_participant() {
        let queues = ParticipantQueues::new(1, 1);
        queues.enqueue(&p("A"), entry(1, 1)).unwrap();
        assert!(queues.enqueue(&p("B"), entry(2, 1)).unwrap());
        assert_eq!(queues.total_size(), 2);
        assert_eq!(queues.remove_everywhere(TaskId::from_parts(1, 1)), 1);
    }
}
