//! Ports - seams to the collaborators around the grid core.
//!
//! Each trait hides a piece of infrastructure (replicated maps, the record
//! store, the participant registry, time, id allocation) so the core runs
//! single-node with the in-memory implementations in `impls`.

pub mod clock;
pub mod id_generator;
pub mod participants;
pub mod persistence;
pub mod replicated_map;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::participants::ParticipantDirectory;
pub use self::persistence::{Persistence, TaskRef};
pub use self::replicated_map::ReplicatedMap;
