use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::{Duration, sleep};
use tracing_subscriber::EnvFilter;

use taskgrid_core::app::{
    Grid, HandlerOutcome, MaintenanceLoop, ParticipantWorkers, TaskHandler,
};
use taskgrid_core::config::GridConfig;
use taskgrid_core::domain::{
    FlowDirection, Manifest, ParticipantName, ParticipantRef, ParticipantRegistration, Payload,
    Subscription, Task,
};
use taskgrid_core::error::GridError;
use taskgrid_core::impls::{InMemoryParticipantRegistry, InMemoryPersistence};

#[derive(Debug, Deserialize)]
struct OrderRequest {
    order: u64,
    amount: u64,
}

/// Turns an order request into an invoice.
struct IntakeHandler;

#[async_trait]
impl TaskHandler for IntakeHandler {
    async fn handle(&self, task: &Task) -> Result<HandlerOutcome, GridError> {
        let req: OrderRequest = serde_json::from_value(task.work_item.ingress.body.clone())
            .map_err(|e| GridError::InvalidArgument(format!("order request: {e}")))?;
        let invoice = serde_json::json!({
            "order": req.order,
            "total": req.amount,
            "currency": "EUR",
        });
        Ok(HandlerOutcome::Finished(vec![Payload::new(
            Manifest::core("Order")
                .with_content("Invoice")
                .with_previous(ParticipantRef::new("Intake", "orders", "1")),
            invoice,
        )]))
    }
}

/// Books invoices and exports a ledger line (export payloads are not fanned out).
struct BillingHandler;

#[async_trait]
impl TaskHandler for BillingHandler {
    async fn handle(&self, task: &Task) -> Result<HandlerOutcome, GridError> {
        tracing::info!(task_id = %task.id(), body = %task.work_item.ingress.body, "invoice booked");
        Ok(HandlerOutcome::Finished(vec![Payload::new(
            Manifest::core("Ledger").with_direction(FlowDirection::Export),
            task.work_item.ingress.body.clone(),
        )]))
    }
}

fn load_config() -> Result<GridConfig, GridError> {
    match std::env::args().nth(1).map(PathBuf::from) {
        Some(path) => GridConfig::from_file(&path),
        None => Ok(GridConfig::default()),
    }
}

fn participants() -> InMemoryParticipantRegistry {
    let registry = InMemoryParticipantRegistry::new();
    registry.upsert(ParticipantRegistration::new(
        "Intake",
        vec![Subscription::to_container("Order").with_content("Request")],
    ));
    registry.upsert(ParticipantRegistration::new(
        "Billing",
        vec![Subscription::to_container("Order").with_content("Invoice")],
    ));
    registry
}

#[tokio::main]
async fn main() -> Result<(), GridError> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // (A) grid with in-memory collaborators
    let config = load_config()?;
    let persistence = Arc::new(InMemoryPersistence::new());
    let grid = Arc::new(Grid::new(config, Arc::new(participants()), persistence)?);

    // (B) background loops
    let maintenance = MaintenanceLoop::spawn(grid.clone());
    let idle = Duration::from_millis(50);
    let intake = ParticipantWorkers::spawn(
        2,
        grid.clone(),
        ParticipantName::new("Intake"),
        Arc::new(IntakeHandler),
        idle,
    );
    let billing = ParticipantWorkers::spawn(
        1,
        grid.clone(),
        ParticipantName::new("Billing"),
        Arc::new(BillingHandler),
        idle,
    );

    // (C) a producer submits order requests
    let portal = ParticipantName::new("Portal");
    for n in 1..=5u64 {
        let task = Task::new(
            grid.new_task_id(&portal),
            Payload::new(
                Manifest::core("Order").with_content("Request"),
                serde_json::json!({ "order": n, "amount": n * 100 }),
            ),
        );
        let ack = grid.register(&portal, task).await?;
        tracing::info!(task_id = %ack.task_id, persistence = ?ack.persistence, "submitted");
    }

    // (D) run until the grid is drained or Ctrl-C
    tokio::select! {
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
        _ = drained(&grid) => tracing::info!("all tasks finalised"),
    }

    intake.shutdown_and_join().await;
    billing.shutdown_and_join().await;
    maintenance.shutdown_and_join().await;

    match serde_json::to_string_pretty(&grid.counts()) {
        Ok(counts) => println!("{counts}"),
        Err(e) => tracing::warn!(error = %e, "could not render counts"),
    }
    Ok(())
}

// Two idle observations in a row, so a successor being registered is not missed.
async fn drained(grid: &Grid) {
    let mut idle_ticks = 0;
    while idle_ticks < 2 {
        sleep(Duration::from_millis(50)).await;
        let counts = grid.counts();
        if counts.store.tasks == 0 && counts.queued == 0 {
            idle_ticks += 1;
        } else {
            idle_ticks = 0;
        }
    }
}
