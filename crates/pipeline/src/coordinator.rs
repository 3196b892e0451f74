//! Batch coordination: one queue delivery in, one redelivery list out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use pbar_config::PipelineConfig;
use pbar_core::event::DomainEvent;
use pbar_core::model::{Notification, QueueMessage};
use pbar_core::outcome::{BatchReport, DropReason, ItemOutcome, RetryReason};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::processor::NotificationProcessor;

/// Processes every message of a batch independently.
///
/// A message's fate never affects its siblings. Malformed bodies are dropped,
/// transient failures are reported for redelivery, and anything still running
/// when the deadline passes is reported for redelivery as well.
pub struct BatchCoordinator {
    processor: Arc<NotificationProcessor>,
    max_concurrent_notifications: usize,
    deadline: Option<Duration>,
}

impl BatchCoordinator {
    pub fn new(processor: Arc<NotificationProcessor>) -> Self {
        Self {
            processor,
            max_concurrent_notifications: 10,
            deadline: None,
        }
    }

    pub fn from_config(processor: Arc<NotificationProcessor>, config: &PipelineConfig) -> Self {
        Self::new(processor)
            .with_max_concurrent_notifications(config.max_concurrent_notifications)
            .with_deadline(Duration::from_secs(config.batch_deadline_secs))
    }

    pub fn with_max_concurrent_notifications(mut self, limit: usize) -> Self {
        self.max_concurrent_notifications = limit.max(1);
        self
    }

    /// Wall-clock budget for a whole batch.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn processor(&self) -> &Arc<NotificationProcessor> {
        &self.processor
    }

    pub async fn process_batch(&self, messages: Vec<QueueMessage>) -> BatchReport {
        let started = Instant::now();
        // A budget past the clock's range means no deadline.
        let deadline = self.deadline.and_then(|budget| started.checked_add(budget));

        let mut outcomes: Vec<Option<ItemOutcome>> = vec![None; messages.len()];
        let mut event_ids: Vec<Option<String>> = vec![None; messages.len()];
        let mut pending = Vec::with_capacity(messages.len());

        for (idx, message) in messages.iter().enumerate() {
            match Notification::parse(&message.body) {
                Ok(notification) => {
                    event_ids[idx] = Some(notification.event_id.clone());
                    pending.push((idx, notification));
                }
                Err(e) => {
                    warn!(message_id = %message.message_id, error = %e, "Dropping malformed notification");
                    outcomes[idx] = Some(ItemOutcome::PermanentDrop(DropReason::Malformed(e)));
                }
            }
        }

        let processor = &self.processor;
        let mut running = stream::iter(pending)
            .map(|(idx, notification)| async move {
                let outcome = processor.process(&notification).await;
                (idx, outcome)
            })
            .buffer_unordered(self.max_concurrent_notifications);

        loop {
            let next = match deadline {
                Some(at) => match tokio::time::timeout_at(at, running.next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            unfinished = outcomes.iter().filter(|o| o.is_none()).count(),
                            "Batch deadline reached, abandoning in-flight notifications"
                        );
                        break;
                    }
                },
                None => running.next().await,
            };

            match next {
                Some((idx, outcome)) => outcomes[idx] = Some(outcome),
                None => break,
            }
        }
        drop(running);

        let mut report = BatchReport::default();
        for ((message, outcome), event_id) in messages.into_iter().zip(outcomes).zip(event_ids) {
            let outcome =
                outcome.unwrap_or(ItemOutcome::RetryableFailure(RetryReason::DeadlineExceeded));

            let disposition = match &outcome {
                ItemOutcome::Success(_) => "success",
                ItemOutcome::RetryableFailure(reason) => {
                    error!(message_id = %message.message_id, reason = %reason, "Notification will be redelivered");
                    "retry"
                }
                ItemOutcome::PermanentDrop(_) => "drop",
            };

            self.processor
                .event_bus()
                .publish(DomainEvent::NotificationProcessed {
                    message_id: message.message_id.clone(),
                    event_id,
                    disposition: disposition.into(),
                    timestamp: Utc::now(),
                });

            report.push(message.message_id, outcome);
        }

        let retried = report.retry_ids().len();
        let dropped = report.dropped();
        let duration_ms = started.elapsed().as_millis() as u64;

        self.processor
            .event_bus()
            .publish(DomainEvent::BatchCompleted {
                size: report.len(),
                retried,
                dropped,
                duration_ms,
                timestamp: Utc::now(),
            });

        info!(
            size = report.len(),
            succeeded = report.succeeded(),
            retried,
            dropped,
            duration_ms,
            "Batch complete"
        );

        report
    }
}
