//! One participant's queue: in-memory entries plus the offloaded index.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use chrono::{DateTime, Utc};

use crate::domain::{QueueEntry, StorageProvenance, StorageStatus, TaskId};

/// Invariant: `entries` is sorted by sequence number (stable for ties).
#[derive(Debug, Default)]
pub struct ParticipantQueue {
    entries: VecDeque<QueueEntry>,
    /// Demoted entries keyed by (sequence, id) so origins sharing a sequence
    /// number do not collide.
    offloaded: BTreeMap<(u64, TaskId), QueueEntry>,
}

impl ParticipantQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn offloaded_len(&self) -> usize {
        self.offloaded.len()
    }

    pub fn contains(&self, task_id: TaskId) -> bool {
        self.entries.iter().any(|e| e.task_id == task_id)
            || self.offloaded.keys().any(|(_, id)| *id == task_id)
    }

    pub fn insert(&mut self, entry: QueueEntry) {
        let at = self.entries.partition_point(|e| e.sequence <= entry.sequence);
        self.entries.insert(at, entry);
    }

    /// Head across both tiers: the lowest sequence wins, in-memory on ties.
    pub fn front(&self) -> Option<&QueueEntry> {
        if self.offloaded_head_first() {
            self.offloaded.values().next()
        } else {
            self.entries.front()
        }
    }

    pub fn pop_front(&mut self) -> Option<QueueEntry> {
        if self.offloaded_head_first() {
            self.offloaded.pop_first().map(|(_, entry)| entry)
        } else {
            self.entries.pop_front()
        }
    }

    /// Put an entry back without a capacity check. It goes to memory when
    /// there is room below `max`, otherwise to the offloaded tier.
    pub fn requeue(&mut self, mut entry: QueueEntry, max: usize, at: DateTime<Utc>) {
        if self.contains(entry.task_id) {
            return;
        }
        if self.entries.len() < max {
            self.insert(entry);
        } else {
            entry.cache = StorageProvenance::new(StorageStatus::Offloaded, entry.cache.location, at);
            self.offloaded.insert((entry.sequence, entry.task_id), entry);
        }
    }

    fn offloaded_head_first(&self) -> bool {
        match (self.entries.front(), self.offloaded.keys().next()) {
            (Some(front), Some((sequence, _))) => *sequence < front.sequence,
            (None, Some(_)) => true,
            _ => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueEntry> {
        self.entries.iter()
    }

    pub fn remove(&mut self, task_id: TaskId) -> Option<QueueEntry> {
        if let Some(pos) = self.entries.iter().position(|e| e.task_id == task_id) {
            return self.entries.remove(pos);
        }
        let key = *self.offloaded.keys().find(|(_, id)| *id == task_id)?;
        self.offloaded.remove(&key)
    }

    pub fn offload_beyond(
        &mut self,
        threshold: usize,
        n: usize,
        at: DateTime<Utc>,
    ) -> Vec<QueueEntry> {
        let available = self.entries.len().saturating_sub(threshold);
        let take = available.min(n);
        let mut demoted = Vec::with_capacity(take);
        for mut entry in self.entries.drain(threshold..threshold + take) {
            entry.cache = StorageProvenance::new(StorageStatus::Offloaded, entry.cache.location, at);
            demoted.push(entry);
        }
        for entry in &demoted {
            self.offloaded
                .insert((entry.sequence, entry.task_id), entry.clone());
        }
        demoted
    }

    /// Restore the `n` lowest offloaded entries to memory.
    pub fn onload(&mut self, n: usize, at: DateTime<Utc>) -> Vec<QueueEntry> {
        let keys: Vec<_> = self.offloaded.keys().take(n).copied().collect();
        let mut restored = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(mut entry) = self.offloaded.remove(&key) {
                entry.cache = StorageProvenance::new(StorageStatus::Cached, entry.cache.location, at);
                self.insert(entry.clone());
                restored.push(entry);
            }
        }
        restored
    }

    pub fn synchronise(&mut self, known_buffered: &BTreeSet<TaskId>) -> BTreeSet<TaskId> {
        self.offloaded
            .retain(|(_, id), _| !known_buffered.contains(id));
        self.offloaded.keys().map(|(_, id)| *id).collect()
    }

    pub fn set_persistence(&mut self, task_id: TaskId, provenance: StorageProvenance) -> bool {
        let slot = self
            .entries
            .iter_mut()
            .chain(self.offloaded.values_mut())
            .find(|e| e.task_id == task_id);
        match slot {
            Some(entry) => {
                entry.persistence = provenance;
                true
            }
            None => false,
        }
    }
}
