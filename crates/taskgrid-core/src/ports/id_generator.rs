//! IdGenerator port - task id allocation.
//!
//! Ids are ULIDs (sortable, generated without coordination across nodes)
//! paired with a per-participant sequence number that orders the queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use ulid::Ulid;

use crate::domain::{ParticipantName, TaskId};
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    /// Allocate a new id whose sequence number is scoped to `origin`.
    fn next_task_id(&self, origin: &ParticipantName) -> TaskId;
}

/// ULID-based generator.
///
/// The timestamp part comes from the injected clock so tests with a
/// `FixedClock` get deterministic ordering of the time component.
pub struct UlidGenerator {
    clock: Arc<dyn Clock>,
    sequences: DashMap<ParticipantName, AtomicU64>,
}

impl UlidGenerator {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            sequences: DashMap::new(),
        }
    }
}

impl IdGenerator for UlidGenerator {
    fn next_task_id(&self, origin: &ParticipantName) -> TaskId {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        let ulid = Ulid::from_parts(timestamp_ms, rand::random());
        let sequence = self
            .sequences
            .entry(origin.clone())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed)
            + 1;
        TaskId::new(ulid, sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, SystemClock};
    use chrono::{TimeZone, Utc};

    #[test]
    fn ulid_generator_generates_unique_ids() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));
        let p = ParticipantName::new("Intake");
        let id1 = id_gen.next_task_id(&p);
        let id2 = id_gen.next_task_id(&p);
        assert_ne!(id1, id2);
    }

    #[test]
    fn sequences_are_scoped_per_participant() {
        let id_gen = UlidGenerator::new(Arc::new(SystemClock));
        let a = ParticipantName::new("A");
        let b = ParticipantName::new("B");
        assert_eq!(id_gen.next_task_id(&a).sequence(), 1);
        assert_eq!(id_gen.next_task_id(&a).sequence(), 2);
        assert_eq!(id_gen.next_task_id(&b).sequence(), 1);
    }

    #[test]
    fn fixed_clock_pins_timestamp_part() {
        let fixed_time = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let id_gen = UlidGenerator::new(Arc::new(FixedClock::new(fixed_time)));
        let id = id_gen.next_task_id(&ParticipantName::new("A"));
        assert_eq!(id.as_ulid().timestamp_ms(), fixed_time.timestamp_millis() as u64);
    }
}
