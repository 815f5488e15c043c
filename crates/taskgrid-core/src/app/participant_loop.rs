//! Participant worker loop: pull -> start -> handle -> finish/fail -> finalise.
//!
//! A participant embedding the grid in-process plugs its business logic in
//! as a `TaskHandler`; `ParticipantWorkers` drives it until shut down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::grid::Grid;
use crate::domain::{ExecutionControl, ParticipantName, Payload, Task};
use crate::error::GridError;

/// What a handler did with a task.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerOutcome {
    /// Done; the payloads are published to downstream subscribers.
    Finished(Vec<Payload>),
    NoActionRequired,
}

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<HandlerOutcome, GridError>;
}

/// Take the participant's next task and drive it to finalisation.
///
/// Returns `Ok(None)` when the queue is empty, otherwise the directive of
/// the last callback.
pub async fn process_next(
    grid: &Grid,
    participant: &ParticipantName,
    handler: &dyn TaskHandler,
) -> Result<Option<ExecutionControl>, GridError> {
    let Some(task) = grid.next_pending_task(participant).await? else {
        return Ok(None);
    };
    let task_id = task.id();

    let control = grid.start(participant, task_id).await;
    if control != ExecutionControl::Execute {
        tracing::debug!(task_id = %task_id, participant = %participant, ?control, "task not started");
        return Ok(Some(control));
    }

    // handler のエラーは fail として扱う (リトライは上流の責務)
    let control = match handler.handle(&task).await {
        Ok(HandlerOutcome::Finished(egress)) => grid.finish(participant, task_id, egress).await,
        Ok(HandlerOutcome::NoActionRequired) => grid.no_action_required(participant, task_id).await,
        Err(e) => {
            tracing::warn!(task_id = %task_id, participant = %participant, error = %e, "handler failed");
            grid.fail(participant, task_id).await
        }
    };
    if control == ExecutionControl::Cancel {
        return Ok(Some(control));
    }
    Ok(Some(grid.finalise(participant, task_id).await))
}

/// Worker group handle.
/// - `request_shutdown()` stops workers from taking new tasks
/// - `shutdown_and_join()` also waits for in-flight tasks to finish
pub struct ParticipantWorkers {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl ParticipantWorkers {
    /// Spawn `n` workers for `participant`. An idle worker polls again
    /// after `idle`.
    pub fn spawn(
        n: usize,
        grid: Arc<Grid>,
        participant: ParticipantName,
        handler: Arc<dyn TaskHandler>,
        idle: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let grid = Arc::clone(&grid);
            let participant = participant.clone();
            let handler = Arc::clone(&handler);
            let mut rx = shutdown_rx.clone();
            joins.push(tokio::spawn(async move {
                worker_loop(worker_id, grid, participant, handler, idle, &mut rx).await;
            }));
        }
        Self { shutdown_tx, joins }
    }

    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    grid: Arc<Grid>,
    participant: ParticipantName,
    handler: Arc<dyn TaskHandler>,
    idle: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        // shutdown が来ていたら抜ける (処理中のタスクは最後まで走らせる)
        if *shutdown_rx.borrow() {
            break;
        }
        let worked = match process_next(&grid, &participant, handler.as_ref()).await {
            Ok(Some(_)) => true,
            Ok(None) => false,
            Err(e) => {
                tracing::warn!(worker_id, participant = %participant, error = %e, "poll failed");
                false
            }
        };
        if worked {
            continue;
        }
        // キューが空: idle 分待つ。shutdown とは select で競合させる
        tokio::select! {
            _ = shutdown_rx.changed() => {}
            _ = tokio::time::sleep(idle) => {}
        }
    }
    tracing::debug!(worker_id, participant = %participant, "worker stopped");
}
