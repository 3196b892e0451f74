//! Store gateway traits.
//!
//! Three narrow views over the persistence layer, one per table the pipeline
//! touches. A single backend usually implements all three; the pipeline takes
//! them separately so tests can fault one without the others.
//!
//! Implementations: SQLite, in-memory (for testing).

use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{CalendarEvent, Milestone, MilestoneSession};

/// Point lookups of calendar events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Fetch an event by identifier. `Ok(None)` when it is not (yet) visible.
    async fn resolve(&self, event_id: &str) -> std::result::Result<Option<CalendarEvent>, StoreError>;
}

/// The category → milestones secondary index.
///
/// Reads are eventually consistent: a milestone created moments ago may be
/// missing from the result. An empty result is not an error.
#[async_trait]
pub trait MilestoneIndex: Send + Sync {
    fn name(&self) -> &str;

    async fn milestones_for_category(
        &self,
        category_id: &str,
    ) -> std::result::Result<Vec<Milestone>, StoreError>;
}

/// Persistence of recorded matches.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn name(&self) -> &str;

    /// Upsert keyed by `session.session_id`. Writing the same session twice
    /// leaves exactly one identical record.
    async fn record_match(&self, session: &MilestoneSession) -> std::result::Result<(), StoreError>;

    /// Fetch a session by its composite key.
    async fn get(&self, session_id: &str) -> std::result::Result<Option<MilestoneSession>, StoreError>;

    /// All sessions credited to one milestone, ordered by start date.
    async fn sessions_for_milestone(
        &self,
        milestone_id: &str,
    ) -> std::result::Result<Vec<MilestoneSession>, StoreError>;

    /// Total number of recorded sessions.
    async fn count(&self) -> std::result::Result<usize, StoreError>;
}
