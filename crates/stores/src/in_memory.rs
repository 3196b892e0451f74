//! In-memory backend, useful for testing and dry runs.

use async_trait::async_trait;
use pbar_core::error::StoreError;
use pbar_core::model::{CalendarEvent, Milestone, MilestoneSession};
use pbar_core::store::{EventStore, MilestoneIndex, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fixtures::Seed;

#[derive(Default)]
struct Tables {
    events: HashMap<String, CalendarEvent>,
    milestones: Vec<Milestone>,
    sessions: HashMap<String, MilestoneSession>,
}

/// Holds all three tables in process memory.
/// Cloning shares the same tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every recorded session, ordered by key.
    pub async fn sessions(&self) -> Vec<MilestoneSession> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<MilestoneSession> = tables.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| a.session_id.cmp(&b.session_id));
        sessions
    }
}

#[async_trait]
impl Seed for InMemoryStore {
    async fn put_event(&self, event: &CalendarEvent) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .events
            .insert(event.event_id.clone(), event.clone());
        Ok(())
    }

    async fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        tables
            .milestones
            .retain(|m| m.milestone_id != milestone.milestone_id);
        tables.milestones.push(milestone.clone());
        Ok(())
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn resolve(&self, event_id: &str) -> Result<Option<CalendarEvent>, StoreError> {
        Ok(self.tables.read().await.events.get(event_id).cloned())
    }
}

#[async_trait]
impl MilestoneIndex for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn milestones_for_category(&self, category_id: &str) -> Result<Vec<Milestone>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .milestones
            .iter()
            .filter(|m| m.category_id == category_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SessionStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn record_match(&self, session: &MilestoneSession) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .sessions
            .insert(session.session_id.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<MilestoneSession>, StoreError> {
        Ok(self.tables.read().await.sessions.get(session_id).cloned())
    }

    async fn sessions_for_milestone(
        &self,
        milestone_id: &str,
    ) -> Result<Vec<MilestoneSession>, StoreError> {
        let tables = self.tables.read().await;
        let mut sessions: Vec<MilestoneSession> = tables
            .sessions
            .values()
            .filter(|s| s.milestone_id == milestone_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| {
            a.start_date
                .cmp(&b.start_date)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(sessions)
    }

    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.tables.read().await.sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(id: &str) -> CalendarEvent {
        CalendarEvent {
            event_id: id.into(),
            user_id: "u-1".into(),
            category: Some("Fitness".into()),
            category_id: Some("C1".into()),
            name: format!("Workout {id}"),
            start_date: format!("2026-02-0{}T07:00:00Z", id.len()),
            duration_minutes: 45,
        }
    }

    fn milestone(id: &str, category_id: &str) -> Milestone {
        Milestone {
            milestone_id: id.into(),
            title: format!("Goal {id}"),
            category_id: category_id.into(),
            user_id: "u-1".into(),
        }
    }

    #[tokio::test]
    async fn resolve_missing_event_is_none() {
        let store = InMemoryStore::new();
        assert!(store.resolve("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn milestones_are_filtered_by_category() {
        let store = InMemoryStore::new();
        store.put_milestone(&milestone("M1", "C1")).await.unwrap();
        store.put_milestone(&milestone("M2", "C1")).await.unwrap();
        store.put_milestone(&milestone("M3", "C2")).await.unwrap();

        let found = store.milestones_for_category("C1").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(store.milestones_for_category("C9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reseeding_a_milestone_replaces_it() {
        let store = InMemoryStore::new();
        store.put_milestone(&milestone("M1", "C1")).await.unwrap();
        store.put_milestone(&milestone("M1", "C2")).await.unwrap();

        assert!(store.milestones_for_category("C1").await.unwrap().is_empty());
        assert_eq!(store.milestones_for_category("C2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn record_match_is_an_upsert() {
        let store = InMemoryStore::new();
        let session = MilestoneSession::from_match(&event("E1"), &milestone("M1", "C1"));

        store.record_match(&session).await.unwrap();
        store.record_match(&session).await.unwrap();

        assert_eq!(store.count().await.unwrap(), 1);
        assert_eq!(store.get("E1:M1").await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn sessions_for_milestone_ordered_by_start() {
        let store = InMemoryStore::new();
        let m1 = milestone("M1", "C1");
        store
            .record_match(&MilestoneSession::from_match(&event("E333"), &m1))
            .await
            .unwrap();
        store
            .record_match(&MilestoneSession::from_match(&event("E1"), &m1))
            .await
            .unwrap();
        store
            .record_match(&MilestoneSession::from_match(&event("E1"), &milestone("M2", "C1")))
            .await
            .unwrap();

        let sessions = store.sessions_for_milestone("M1").await.unwrap();
        let keys: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(keys, vec!["E1:M1", "E333:M1"]);
    }

    #[tokio::test]
    async fn clones_share_tables() {
        let store = InMemoryStore::new();
        let other = store.clone();
        store.put_event(&event("E1")).await.unwrap();
        assert!(other.resolve("E1").await.unwrap().is_some());
    }
}
