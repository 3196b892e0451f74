//! Per-notification processing.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use pbar_core::event::{DomainEvent, EventBus};
use pbar_core::model::{CalendarEvent, Milestone, MilestoneSession, Notification};
use pbar_core::oracle::{Classifier, Verdict};
use pbar_core::outcome::{Completion, ItemOutcome, MatchTally, RetryReason};
use pbar_core::store::{EventStore, MilestoneIndex, SessionStore};
use tracing::{debug, error, info, warn};

/// Runs a single notification to a terminal [`ItemOutcome`].
///
/// ```text
/// resolve event ──none/err──▶ retry
///      │
/// category? ──empty──▶ success (no work)
///      │
/// milestones ──err──▶ retry
///      │     ──empty──▶ success (no work)
///      ▼
/// classify each ──"yes"──▶ upsert session
/// ```
///
/// Oracle errors and session write failures are absorbed per milestone; they
/// never fail the notification.
pub struct NotificationProcessor {
    events: Arc<dyn EventStore>,
    milestones: Arc<dyn MilestoneIndex>,
    sessions: Arc<dyn SessionStore>,
    classifier: Arc<dyn Classifier>,
    event_bus: Arc<EventBus>,
    max_concurrent_milestones: usize,
}

impl NotificationProcessor {
    pub fn new(
        events: Arc<dyn EventStore>,
        milestones: Arc<dyn MilestoneIndex>,
        sessions: Arc<dyn SessionStore>,
        classifier: Arc<dyn Classifier>,
    ) -> Self {
        Self {
            events,
            milestones,
            sessions,
            classifier,
            event_bus: Arc::new(EventBus::default()),
            max_concurrent_milestones: 4,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Oracle calls in flight for one event.
    pub fn with_max_concurrent_milestones(mut self, limit: usize) -> Self {
        self.max_concurrent_milestones = limit.max(1);
        self
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub async fn process(&self, notification: &Notification) -> ItemOutcome {
        let event_id = notification.event_id.as_str();

        let event = match self.events.resolve(event_id).await {
            Ok(Some(event)) => event,
            Ok(None) => {
                error!(event_id, "Event not found, will retry");
                return ItemOutcome::RetryableFailure(RetryReason::EventNotFound);
            }
            Err(e) => {
                error!(event_id, error = %e, "Event lookup failed");
                return ItemOutcome::RetryableFailure(RetryReason::EventLookup(e));
            }
        };

        let Some(category) = event.classified_category() else {
            info!(event_id, "Event has no category, skipping");
            return ItemOutcome::Success(Completion::NoCategory);
        };

        let Some(category_id) = event.category_key() else {
            warn!(event_id, category, "Event has a category but no category id, skipping");
            return ItemOutcome::Success(Completion::NoCategoryId);
        };

        let milestones = match self.milestones.milestones_for_category(category_id).await {
            Ok(milestones) => milestones,
            Err(e) => {
                error!(event_id, category_id, error = %e, "Milestone query failed");
                return ItemOutcome::RetryableFailure(RetryReason::MilestoneQuery(e));
            }
        };

        if milestones.is_empty() {
            info!(event_id, category_id, "No milestones for category");
            return ItemOutcome::Success(Completion::NoMilestones);
        }

        debug!(event_id, category_id, candidates = milestones.len(), "Classifying event");

        let evaluations: Vec<_> = milestones
            .iter()
            .map(|milestone| self.evaluate(&event, milestone))
            .collect();
        let tally = stream::iter(evaluations)
            .buffer_unordered(self.max_concurrent_milestones)
            .fold(MatchTally::default(), |mut total, tally| async move {
                total.merge(tally);
                total
            })
            .await;

        info!(
            event_id,
            evaluated = tally.evaluated,
            matched = tally.matched,
            recorded = tally.recorded,
            "Event classified"
        );

        ItemOutcome::Success(Completion::Evaluated(tally))
    }

    /// Classify one (event, milestone) pair and record a match.
    async fn evaluate(&self, event: &CalendarEvent, milestone: &Milestone) -> MatchTally {
        let mut tally = MatchTally {
            evaluated: 1,
            ..MatchTally::default()
        };

        let reply = match self.classifier.classify(&event.name, &milestone.title).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    event_id = %event.event_id,
                    milestone_id = %milestone.milestone_id,
                    classifier = self.classifier.name(),
                    error = %e,
                    "Oracle call failed, treating as no match"
                );
                self.event_bus.publish(DomainEvent::OracleFailed {
                    event_id: event.event_id.clone(),
                    milestone_id: milestone.milestone_id.clone(),
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                tally.oracle_failures = 1;
                return tally;
            }
        };

        if !Verdict::from_response(&reply).is_match() {
            debug!(
                event_id = %event.event_id,
                milestone_id = %milestone.milestone_id,
                reply = %reply,
                "No match"
            );
            return tally;
        }

        tally.matched = 1;
        let session = MilestoneSession::from_match(event, milestone);

        match self.sessions.record_match(&session).await {
            Ok(()) => {
                info!(session_id = %session.session_id, "Recorded milestone session");
                self.event_bus.publish(DomainEvent::SessionRecorded {
                    session_id: session.session_id.clone(),
                    user_id: session.user_id.clone(),
                    timestamp: Utc::now(),
                });
                tally.recorded = 1;
            }
            Err(e) => {
                warn!(session_id = %session.session_id, error = %e, "Session write failed, skipping");
                self.event_bus.publish(DomainEvent::SessionWriteFailed {
                    session_id: session.session_id,
                    error_message: e.to_string(),
                    timestamp: Utc::now(),
                });
                tally.write_failures = 1;
            }
        }

        tally
    }
}
