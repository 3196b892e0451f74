//! Per-item outcomes and the batch report handed back to the queue.
//!
//! Every notification ends in exactly one [`ItemOutcome`]. Only
//! [`ItemOutcome::RetryableFailure`] puts the message back on the queue.

use serde::{Deserialize, Serialize};

use crate::error::{NotificationError, StoreError};

/// Counters for an event that reached classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchTally {
    /// Milestones sent to the oracle.
    pub evaluated: usize,
    /// Oracle replied with the affirmative token.
    pub matched: usize,
    /// Matches persisted as sessions.
    pub recorded: usize,
    /// Oracle transport errors (treated as no match).
    pub oracle_failures: usize,
    /// Matches whose session write failed.
    pub write_failures: usize,
}

impl MatchTally {
    pub fn merge(&mut self, other: MatchTally) {
        self.evaluated += other.evaluated;
        self.matched += other.matched;
        self.recorded += other.recorded;
        self.oracle_failures += other.oracle_failures;
        self.write_failures += other.write_failures;
    }
}

/// How a successfully handled notification terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    /// The event carries no category label.
    NoCategory,
    /// Labelled, but without a category identifier to query by.
    NoCategoryId,
    /// The index returned no milestones for the category.
    NoMilestones,
    /// Every candidate milestone was classified.
    Evaluated(MatchTally),
}

/// Why a notification should be redelivered.
#[derive(Debug, Clone)]
pub enum RetryReason {
    EventLookup(StoreError),
    /// Possibly not visible yet under eventual consistency.
    EventNotFound,
    MilestoneQuery(StoreError),
    /// The batch deadline expired before this item finished.
    DeadlineExceeded,
}

impl std::fmt::Display for RetryReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RetryReason::EventLookup(e) => write!(f, "event lookup failed: {e}"),
            RetryReason::EventNotFound => write!(f, "event not found"),
            RetryReason::MilestoneQuery(e) => write!(f, "milestone query failed: {e}"),
            RetryReason::DeadlineExceeded => write!(f, "batch deadline exceeded"),
        }
    }
}

/// Why a notification was discarded without retry.
#[derive(Debug, Clone)]
pub enum DropReason {
    Malformed(NotificationError),
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::Malformed(e) => write!(f, "{e}"),
        }
    }
}

/// The fate of one queue message.
#[derive(Debug, Clone)]
pub enum ItemOutcome {
    Success(Completion),
    RetryableFailure(RetryReason),
    PermanentDrop(DropReason),
}

impl ItemOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ItemOutcome::RetryableFailure(_))
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ItemOutcome::Success(_))
    }

    /// Match counters, when the item reached classification.
    pub fn tally(&self) -> Option<MatchTally> {
        match self {
            ItemOutcome::Success(Completion::Evaluated(tally)) => Some(*tally),
            _ => None,
        }
    }
}

/// One row of a [`BatchReport`].
#[derive(Debug, Clone)]
pub struct ItemReport {
    pub message_id: String,
    pub outcome: ItemOutcome,
}

/// Outcomes for a whole batch, in delivery order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub items: Vec<ItemReport>,
}

impl BatchReport {
    pub fn push(&mut self, message_id: impl Into<String>, outcome: ItemOutcome) {
        self.items.push(ItemReport {
            message_id: message_id.into(),
            outcome,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Message identifiers the queue must redeliver.
    pub fn retry_ids(&self) -> Vec<String> {
        self.items
            .iter()
            .filter(|item| item.outcome.is_retryable())
            .map(|item| item.message_id.clone())
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|i| i.outcome.is_success()).count()
    }

    pub fn dropped(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ItemOutcome::PermanentDrop(_)))
            .count()
    }

    pub fn outcome_for(&self, message_id: &str) -> Option<&ItemOutcome> {
        self.items
            .iter()
            .find(|i| i.message_id == message_id)
            .map(|i| &i.outcome)
    }

    /// Sum of match counters across the batch.
    pub fn tally(&self) -> MatchTally {
        let mut total = MatchTally::default();
        for tally in self.items.iter().filter_map(|i| i.outcome.tally()) {
            total.merge(tally);
        }
        total
    }

    /// The partial-failure response understood by the queue.
    pub fn to_response(&self) -> BatchResponse {
        BatchResponse {
            batch_item_failures: self
                .retry_ids()
                .into_iter()
                .map(|item_identifier| BatchItemFailure { item_identifier })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}
