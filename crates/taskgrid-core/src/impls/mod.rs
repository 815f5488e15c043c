//! In-memory implementations of the ports, used single-node and in tests.

pub mod inmem_persistence;
pub mod local_map;
pub mod participant_registry;

pub use self::inmem_persistence::InMemoryPersistence;
pub use self::local_map::LocalReplicatedMap;
pub use self::participant_registry::InMemoryParticipantRegistry;
