//! Domain identifiers.
//!
//! A `TaskId` is a ULID (globally unique, sortable by creation time) paired
//! with the sequence number the originating participant assigned. The ULID
//! alone decides identity; the sequence number decides queue order.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use ulid::Ulid;

/// Identifier of an actionable task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskId {
    ulid: Ulid,
    sequence: u64,
}

impl TaskId {
    pub fn new(ulid: Ulid, sequence: u64) -> Self {
        Self { ulid, sequence }
    }

    /// Test helper: deterministic id built from a small integer.
    pub fn from_parts(value: u128, sequence: u64) -> Self {
        Self::new(Ulid::from_bytes(value.to_be_bytes()), sequence)
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }

    /// Sequence number scoped to the originating participant.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

// Identity is the ULID only; the same task re-registered with a different
// sequence number is still the same task.
impl PartialEq for TaskId {
    fn eq(&self, other: &Self) -> bool {
        self.ulid == other.ulid
    }
}

impl Eq for TaskId {}

impl Hash for TaskId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ulid.hash(state);
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ulid.cmp(&other.ulid)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}#{}", self.ulid, self.sequence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_sequence() {
        let ulid = Ulid::new();
        assert_eq!(TaskId::new(ulid, 1), TaskId::new(ulid, 7));
    }

    #[test]
    fn display_carries_prefix_and_sequence() {
        let id = TaskId::from_parts(42, 3);
        let shown = id.to_string();
        assert!(shown.starts_with("task-"));
        assert!(shown.ends_with("#3"));
    }

    #[test]
    fn ulid_ids_are_sortable() {
        let id1 = TaskId::new(Ulid::new(), 0);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TaskId::new(Ulid::new(), 0);
        assert!(id1 < id2);
    }

    #[test]
    fn ids_can_be_serialized() {
        let id = TaskId::new(Ulid::new(), 9);
        let serialized = serde_json::to_string(&id).unwrap();
        let back: TaskId = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, id);
        assert_eq!(back.sequence(), 9);
    }
}
