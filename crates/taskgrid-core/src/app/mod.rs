//! App - the grid facade and the loops that run around it.
//!
//! # Components
//! - **Grid**: owns the caches and collaborators, entry point for producers and participants
//! - **MaintenanceLoop**: periodic eviction and persistence retry
//! - **ParticipantWorkers**: in-process participant driving `TaskHandler`s

pub mod grid;
pub mod maintenance;
pub mod participant_loop;

pub use self::grid::{Grid, GridCounts, Registered};
pub use self::maintenance::{MaintenanceLoop, SweepReport, sweep};
pub use self::participant_loop::{HandlerOutcome, ParticipantWorkers, TaskHandler, process_next};
