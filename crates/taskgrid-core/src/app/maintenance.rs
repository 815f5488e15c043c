//! MaintenanceLoop - periodic sweep over the grid's caches.
//!
//! # Flow (per tick)
//! 1. report cache sizes
//! 2. evict registrations older than the eviction threshold (queue entries too)
//! 3. retry persistence writes still marked `NotYetPersisted`

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::grid::Grid;

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: usize,
    pub persisted: usize,
}

/// Handle to the background sweep.
/// - `request_shutdown()` stops it after the current tick
/// - `shutdown_and_join()` also waits for it to exit
pub struct MaintenanceLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl MaintenanceLoop {
    /// Spawn with the delays from the grid's config.
    pub fn spawn(grid: Arc<Grid>) -> Self {
        let initial_delay = grid.config().maintenance_initial_delay();
        let interval = grid.config().maintenance_interval();
        Self::spawn_with(grid, initial_delay, interval)
    }

    pub fn spawn_with(grid: Arc<Grid>, initial_delay: Duration, interval: Duration) -> Self {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            run(grid, initial_delay, interval, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

/// One sweep, callable directly from tests and tools.
pub async fn sweep(grid: &Grid) -> SweepReport {
    let counts = grid.counts();
    tracing::info!(
        tasks = counts.store.tasks,
        registrations = counts.store.registrations,
        active = counts.store.active,
        terminal = counts.store.terminal,
        pending_persistence = counts.store.pending_persistence,
        queued = counts.queued,
        offloaded = counts.offloaded,
        "grid cache sizes"
    );
    // Retry first: eviction keeps anything still unpersisted.
    let persisted = grid.retry_pending_persistence().await;
    let evicted = grid.evict_aged().len();
    SweepReport { evicted, persisted }
}

async fn run(
    grid: Arc<Grid>,
    initial_delay: Duration,
    interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    let start = tokio::time::Instant::now() + initial_delay;
    let mut ticker = tokio::time::interval_at(start, interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        // 次の tick まで待つ。shutdown が先に来たらループ先頭で判定
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }
        let report = sweep(&grid).await;
        tracing::debug!(evicted = report.evicted, persisted = report.persisted, "maintenance tick");
    }
}
