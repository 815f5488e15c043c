//! taskgrid-core
//!
//! Central task-distribution grid: accepts tasks from producers, routes them
//! to participants by content-based subscription, and tracks each task from
//! registration to finalisation.
//!
//! # Modules
//! - **domain**: ids, manifests, subscriptions, tasks, lifecycle statuses
//! - **ports**: abstractions over persistence, replicated maps, the participant directory, clock and ids
//! - **impls**: in-memory implementations of the ports
//! - **store**: Task Store (registrations, status cache, eviction)
//! - **queue**: per-participant queues with offload/onload
//! - **matcher**: subscription matching
//! - **chain**: propagation of finished tasks to subscribers
//! - **lifecycle**: participant callbacks and persistence writes
//! - **app**: `Grid` facade, maintenance sweep, participant workers

pub mod app;
pub mod chain;
pub mod config;
pub mod domain;
pub mod error;
pub mod impls;
pub mod lifecycle;
pub mod matcher;
pub mod ports;
pub mod queue;
pub mod store;

pub use app::{Grid, Registered};
pub use config::GridConfig;
pub use error::GridError;
