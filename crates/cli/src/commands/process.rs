//! `pbar process` — Run one batch locally.
//!
//! Input is either a queue envelope (`{"Records": [...]}`) or one
//! notification body per line. The redelivery list is printed to stdout in
//! the queue's response shape; a summary goes to stderr.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pbar_core::event::{DomainEvent, EventBus};
use pbar_core::model::{QueueBatch, QueueMessage};
use tokio::io::AsyncReadExt;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::warn;

use super::context;

pub async fn run(config_path: &Path, file: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let config = context::load_config(config_path)?;

    let input = match file {
        Some(path) => tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| format!("Failed to read {}: {e}", path.display()))?,
        None => {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await?;
            buf
        }
    };
    let messages = parse_input(&input);

    let stores = context::open_stores(&config).await?;
    let event_bus = Arc::new(EventBus::default());
    let mut events = event_bus.subscribe();
    let coordinator = context::build_coordinator(&config, &stores, event_bus)?;

    let report = coordinator.process_batch(messages).await;
    println!("{}", serde_json::to_string_pretty(&report.to_response())?);

    let mut summary = Summary::default();
    loop {
        match events.try_recv() {
            Ok(event) => summary.observe(&event),
            Err(TryRecvError::Lagged(skipped)) => {
                warn!(skipped, "Summary missed domain events");
            }
            Err(_) => break,
        }
    }
    eprintln!(
        "processed {} message(s): {} ok, {} retry, {} dropped | {} session(s) recorded, {} oracle failure(s), {} write failure(s)",
        report.len(),
        report.succeeded(),
        report.retry_ids().len(),
        report.dropped(),
        summary.recorded,
        summary.oracle_failures,
        summary.write_failures,
    );

    Ok(())
}

/// Decode a batch: the queue envelope if it parses as one, else one body per
/// non-blank line with a generated message id.
fn parse_input(input: &str) -> Vec<QueueMessage> {
    if let Ok(batch) = serde_json::from_str::<QueueBatch>(input) {
        if !batch.records.is_empty() {
            return batch.records;
        }
    }

    input
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| QueueMessage::new(uuid::Uuid::new_v4().to_string(), line))
        .collect()
}

#[derive(Default)]
struct Summary {
    recorded: usize,
    oracle_failures: usize,
    write_failures: usize,
}

impl Summary {
    fn observe(&mut self, event: &DomainEvent) {
        match event {
            DomainEvent::SessionRecorded { .. } => self.recorded += 1,
            DomainEvent::OracleFailed { .. } => self.oracle_failures += 1,
            DomainEvent::SessionWriteFailed { .. } => self.write_failures += 1,
            _ => {}
        }
    }
}
