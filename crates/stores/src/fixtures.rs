//! Fixture loading. Seeds events and milestones from a JSON document.
//!
//! ```json
//! {
//!   "events":     [{ "event_uid": "E1", "user_id": "u-1", ... }],
//!   "milestones": [{ "milestone_user_datetime_uid": "M1", "milestone": "...", ... }]
//! }
//! ```

use std::path::Path;

use async_trait::async_trait;
use pbar_core::error::StoreError;
use pbar_core::model::{CalendarEvent, Milestone};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Write access to the read-side tables. Only used for seeding and tests;
/// the pipeline itself never writes events or milestones.
#[async_trait]
pub trait Seed: Send + Sync {
    async fn put_event(&self, event: &CalendarEvent) -> Result<(), StoreError>;

    async fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Fixtures {
    #[serde(default)]
    pub events: Vec<CalendarEvent>,

    #[serde(default)]
    pub milestones: Vec<Milestone>,
}

impl Fixtures {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json).map_err(|e| StoreError::Corrupt(format!("fixture JSON: {e}")))
    }

    pub async fn load(path: &Path) -> Result<Self, StoreError> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&content)
    }

    /// Write every record into `target`. Returns (events, milestones) written.
    pub async fn apply(&self, target: &dyn Seed) -> Result<(usize, usize), StoreError> {
        for event in &self.events {
            target.put_event(event).await?;
        }
        for milestone in &self.milestones {
            target.put_milestone(milestone).await?;
        }
        info!(
            events = self.events.len(),
            milestones = self.milestones.len(),
            "Fixtures applied"
        );
        Ok((self.events.len(), self.milestones.len()))
    }
}
