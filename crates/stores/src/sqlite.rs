//! SQLite backend.
//!
//! One database file holds the three tables the pipeline touches:
//! - `pb_events`: calendar events, keyed by `event_uid`
//! - `pb_milestones`: milestones, with the `UserCategoryIndex` on `category_uid`
//! - `pb_milestone_sessions`: recorded matches, keyed by `milestone_session_uid`

use async_trait::async_trait;
use pbar_core::error::StoreError;
use pbar_core::model::{CalendarEvent, Milestone, MilestoneSession};
use pbar_core::store::{EventStore, MilestoneIndex, SessionStore};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::fixtures::Seed;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and run migrations.
    ///
    /// Pass `"sqlite::memory:"` for an ephemeral database; the pool is then
    /// pinned to one connection so every query sees the same data.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite://{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| StoreError::Unavailable(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let max_connections = if url.contains(":memory:") { 1 } else { 4 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pb_events (
                event_uid       TEXT PRIMARY KEY NOT NULL,
                user_id         TEXT NOT NULL,
                category        TEXT,
                category_uid    TEXT,
                event_name      TEXT NOT NULL DEFAULT '',
                event_startdate TEXT NOT NULL DEFAULT '',
                minutes         INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("pb_events table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pb_milestones (
                milestone_user_datetime_uid TEXT PRIMARY KEY NOT NULL,
                milestone                   TEXT NOT NULL,
                category_uid                TEXT NOT NULL,
                user_id                     TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("pb_milestones table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS UserCategoryIndex ON pb_milestones(category_uid)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("UserCategoryIndex: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pb_milestone_sessions (
                milestone_session_uid       TEXT PRIMARY KEY NOT NULL,
                milestone_user_datetime_uid TEXT NOT NULL,
                milestone                   TEXT NOT NULL,
                event_name                  TEXT NOT NULL,
                user_id                     TEXT NOT NULL,
                category                    TEXT NOT NULL,
                category_uid                TEXT NOT NULL,
                event_startdate             TEXT NOT NULL,
                minutes                     INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("pb_milestone_sessions table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_sessions_milestone ON pb_milestone_sessions(milestone_user_datetime_uid, event_startdate)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn column<T>(row: &sqlx::sqlite::SqliteRow, name: &str) -> Result<T, StoreError>
    where
        T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
    {
        row.try_get(name)
            .map_err(|e| StoreError::Corrupt(format!("{name} column: {e}")))
    }

    fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<CalendarEvent, StoreError> {
        Ok(CalendarEvent {
            event_id: Self::column(row, "event_uid")?,
            user_id: Self::column(row, "user_id")?,
            category: Self::column(row, "category")?,
            category_id: Self::column(row, "category_uid")?,
            name: Self::column(row, "event_name")?,
            start_date: Self::column(row, "event_startdate")?,
            duration_minutes: Self::column(row, "minutes")?,
        })
    }

    fn row_to_milestone(row: &sqlx::sqlite::SqliteRow) -> Result<Milestone, StoreError> {
        Ok(Milestone {
            milestone_id: Self::column(row, "milestone_user_datetime_uid")?,
            title: Self::column(row, "milestone")?,
            category_id: Self::column(row, "category_uid")?,
            user_id: Self::column(row, "user_id")?,
        })
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<MilestoneSession, StoreError> {
        Ok(MilestoneSession {
            session_id: Self::column(row, "milestone_session_uid")?,
            milestone_id: Self::column(row, "milestone_user_datetime_uid")?,
            title: Self::column(row, "milestone")?,
            event_name: Self::column(row, "event_name")?,
            user_id: Self::column(row, "user_id")?,
            category: Self::column(row, "category")?,
            category_id: Self::column(row, "category_uid")?,
            start_date: Self::column(row, "event_startdate")?,
            duration_minutes: Self::column(row, "minutes")?,
        })
    }
}

#[async_trait]
impl Seed for SqliteStore {
    async fn put_event(&self, event: &CalendarEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pb_events (event_uid, user_id, category, category_uid, event_name, event_startdate, minutes)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(event_uid) DO UPDATE SET
                user_id = excluded.user_id,
                category = excluded.category,
                category_uid = excluded.category_uid,
                event_name = excluded.event_name,
                event_startdate = excluded.event_startdate,
                minutes = excluded.minutes
            "#,
        )
        .bind(&event.event_id)
        .bind(&event.user_id)
        .bind(&event.category)
        .bind(&event.category_id)
        .bind(&event.name)
        .bind(&event.start_date)
        .bind(event.duration_minutes)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("INSERT pb_events failed: {e}")))?;

        debug!(event_id = %event.event_id, "Stored event");
        Ok(())
    }

    async fn put_milestone(&self, milestone: &Milestone) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pb_milestones (milestone_user_datetime_uid, milestone, category_uid, user_id)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(milestone_user_datetime_uid) DO UPDATE SET
                milestone = excluded.milestone,
                category_uid = excluded.category_uid,
                user_id = excluded.user_id
            "#,
        )
        .bind(&milestone.milestone_id)
        .bind(&milestone.title)
        .bind(&milestone.category_id)
        .bind(&milestone.user_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("INSERT pb_milestones failed: {e}")))?;

        debug!(milestone_id = %milestone.milestone_id, "Stored milestone");
        Ok(())
    }
}

#[async_trait]
impl EventStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn resolve(&self, event_id: &str) -> Result<Option<CalendarEvent>, StoreError> {
        let row = sqlx::query("SELECT * FROM pb_events WHERE event_uid = ?1")
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET event: {e}")))?;

        row.as_ref().map(Self::row_to_event).transpose()
    }
}

#[async_trait]
impl MilestoneIndex for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn milestones_for_category(&self, category_id: &str) -> Result<Vec<Milestone>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM pb_milestones INDEXED BY UserCategoryIndex WHERE category_uid = ?1",
        )
        .bind(category_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("UserCategoryIndex lookup: {e}")))?;

        rows.iter().map(Self::row_to_milestone).collect()
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn record_match(&self, session: &MilestoneSession) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO pb_milestone_sessions (
                milestone_session_uid, milestone_user_datetime_uid, milestone, event_name,
                user_id, category, category_uid, event_startdate, minutes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(milestone_session_uid) DO UPDATE SET
                milestone_user_datetime_uid = excluded.milestone_user_datetime_uid,
                milestone = excluded.milestone,
                event_name = excluded.event_name,
                user_id = excluded.user_id,
                category = excluded.category,
                category_uid = excluded.category_uid,
                event_startdate = excluded.event_startdate,
                minutes = excluded.minutes
            "#,
        )
        .bind(&session.session_id)
        .bind(&session.milestone_id)
        .bind(&session.title)
        .bind(&session.event_name)
        .bind(&session.user_id)
        .bind(&session.category)
        .bind(&session.category_id)
        .bind(&session.start_date)
        .bind(session.duration_minutes)
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::WriteFailed(format!("UPSERT session failed: {e}")))?;

        debug!(session_id = %session.session_id, "Recorded milestone session");
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<MilestoneSession>, StoreError> {
        let row = sqlx::query("SELECT * FROM pb_milestone_sessions WHERE milestone_session_uid = ?1")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("GET session: {e}")))?;

        row.as_ref().map(Self::row_to_session).transpose()
    }

    async fn sessions_for_milestone(
        &self,
        milestone_id: &str,
    ) -> Result<Vec<MilestoneSession>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM pb_milestone_sessions
            WHERE milestone_user_datetime_uid = ?1
            ORDER BY event_startdate, milestone_session_uid
            "#,
        )
        .bind(milestone_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("sessions for milestone: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn count(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM pb_milestone_sessions")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;

        Ok(cnt as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_store() -> SqliteStore {
        SqliteStore::new("sqlite::memory:").await.unwrap()
    }

    fn make_event(id: &str, category_id: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            event_id: id.into(),
            user_id: "u-1".into(),
            category: category_id.map(|_| "Writing".to_string()),
            category_id: category_id.map(String::from),
            name: "Draft chapter".into(),
            start_date: "2026-03-01T09:00:00Z".into(),
            duration_minutes: 120,
        }
    }

    fn make_milestone(id: &str, category_id: &str) -> Milestone {
        Milestone {
            milestone_id: id.into(),
            title: format!("Project {id}"),
            category_id: category_id.into(),
            user_id: "u-1".into(),
        }
    }

    #[tokio::test]
    async fn event_round_trip_with_nulls() {
        let db = test_store().await;
        db.put_event(&make_event("E1", None)).await.unwrap();

        let event = db.resolve("E1").await.unwrap().unwrap();
        assert_eq!(event.category, None);
        assert_eq!(event.category_id, None);
        assert_eq!(event.duration_minutes, 120);
        assert!(db.resolve("E2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn category_index_lookup() {
        let db = test_store().await;
        db.put_milestone(&make_milestone("M1", "C1")).await.unwrap();
        db.put_milestone(&make_milestone("M2", "C1")).await.unwrap();
        db.put_milestone(&make_milestone("M3", "C2")).await.unwrap();

        let mut ids: Vec<String> = db
            .milestones_for_category("C1")
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.milestone_id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["M1", "M2"]);
        assert!(db.milestones_for_category("C3").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_on_conflict() {
        let db = test_store().await;
        let event = make_event("E1", Some("C1"));
        let session = MilestoneSession::from_match(&event, &make_milestone("M1", "C1"));

        db.record_match(&session).await.unwrap();
        db.record_match(&session).await.unwrap();

        assert_eq!(db.count().await.unwrap(), 1);
        assert_eq!(db.get("E1:M1").await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn upsert_overwrites_changed_fields() {
        let db = test_store().await;
        let milestone = make_milestone("M1", "C1");
        let mut event = make_event("E1", Some("C1"));
        db.record_match(&MilestoneSession::from_match(&event, &milestone))
            .await
            .unwrap();

        event.name = "Draft chapter 2".into();
        db.record_match(&MilestoneSession::from_match(&event, &milestone))
            .await
            .unwrap();

        let stored = db.get("E1:M1").await.unwrap().unwrap();
        assert_eq!(stored.event_name, "Draft chapter 2");
        assert_eq!(db.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn sessions_for_milestone_ordered_by_start() {
        let db = test_store().await;
        let milestone = make_milestone("M1", "C1");
        let mut later = make_event("E2", Some("C1"));
        later.start_date = "2026-04-01T09:00:00Z".into();
        let earlier = make_event("E1", Some("C1"));

        db.record_match(&MilestoneSession::from_match(&later, &milestone))
            .await
            .unwrap();
        db.record_match(&MilestoneSession::from_match(&earlier, &milestone))
            .await
            .unwrap();

        let sessions = db.sessions_for_milestone("M1").await.unwrap();
        let keys: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(keys, vec!["E1:M1", "E2:M1"]);
        assert!(db.sessions_for_milestone("M9").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_database_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pbar.sqlite");
        let path = path.to_string_lossy().to_string();

        {
            let db = SqliteStore::new(&path).await.unwrap();
            db.put_event(&make_event("E1", Some("C1"))).await.unwrap();
        }

        let db = SqliteStore::new(&path).await.unwrap();
        assert!(db.resolve("E1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn count_empty() {
        let db = test_store().await;
        assert_eq!(db.count().await.unwrap(), 0);
    }
}
