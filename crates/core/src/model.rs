//! Domain records that flow through the pipeline.
//!
//! A [`QueueMessage`] arrives from the queue, its body parses into a
//! [`Notification`], which names a [`CalendarEvent`]. The event's category
//! selects candidate [`Milestone`]s, and every positive classification becomes
//! one [`MilestoneSession`].
//!
//! Field names follow the pipeline's vocabulary; serde aliases accept the
//! attribute names used by the upstream calendar tables.

use serde::{Deserialize, Serialize};

use crate::error::NotificationError;

/// Separator between the event and milestone halves of a session key.
pub const SESSION_KEY_SEPARATOR: char = ':';

/// Build the composite key of a [`MilestoneSession`].
pub fn session_key(event_id: &str, milestone_id: &str) -> String {
    format!("{event_id}{SESSION_KEY_SEPARATOR}{milestone_id}")
}

/// A raw message as delivered by the queue collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueMessage {
    /// Identifier echoed back when the message must be redelivered.
    pub message_id: String,

    /// JSON payload, expected to decode into a [`Notification`].
    pub body: String,
}

impl QueueMessage {
    pub fn new(message_id: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            body: body.into(),
        }
    }
}

/// A delivery of several queue messages at once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueBatch {
    #[serde(rename = "Records", alias = "records", default)]
    pub records: Vec<QueueMessage>,
}

/// "This event's classification changed, re-evaluate it."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "event_uid", alias = "EventUID")]
    pub event_id: String,
}

impl Notification {
    pub fn new(event_id: impl Into<String>) -> Self {
        Self {
            event_id: event_id.into(),
        }
    }

    /// Decode a queue message body.
    pub fn parse(body: &str) -> Result<Self, NotificationError> {
        let notification: Self =
            serde_json::from_str(body).map_err(|e| NotificationError::Malformed(e.to_string()))?;
        if notification.event_id.trim().is_empty() {
            return Err(NotificationError::MissingEventId);
        }
        Ok(notification)
    }
}

/// A calendar event as stored by the ingestion subsystem. Read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(alias = "event_uid")]
    pub event_id: String,

    pub user_id: String,

    /// Category label; `None` or empty means the event is unclassified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, alias = "category_uid", skip_serializing_if = "Option::is_none")]
    pub category_id: Option<String>,

    #[serde(default, alias = "event_name")]
    pub name: String,

    #[serde(default, alias = "event_startdate")]
    pub start_date: String,

    #[serde(default, alias = "minutes")]
    pub duration_minutes: i64,
}

impl CalendarEvent {
    /// The category label, if the event has been classified.
    pub fn classified_category(&self) -> Option<&str> {
        self.category.as_deref().filter(|c| !c.is_empty())
    }

    /// The category identifier used to query the milestone index.
    pub fn category_key(&self) -> Option<&str> {
        self.category_id.as_deref().filter(|c| !c.is_empty())
    }
}

/// A user-defined long-running goal ("project").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Milestone {
    #[serde(alias = "milestone_user_datetime_uid")]
    pub milestone_id: String,

    #[serde(alias = "milestone")]
    pub title: String,

    #[serde(alias = "category_uid")]
    pub category_id: String,

    pub user_id: String,
}

/// The record that an event was judged to contribute to a milestone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneSession {
    #[serde(alias = "milestone_session_uid")]
    pub session_id: String,

    #[serde(alias = "milestone_user_datetime_uid")]
    pub milestone_id: String,

    #[serde(alias = "milestone")]
    pub title: String,

    pub event_name: String,
    pub user_id: String,
    pub category: String,

    #[serde(alias = "category_uid")]
    pub category_id: String,

    #[serde(alias = "event_startdate")]
    pub start_date: String,

    #[serde(alias = "minutes")]
    pub duration_minutes: i64,
}

impl MilestoneSession {
    /// Derive the session for a positive (event, milestone) match.
    ///
    /// Every field is a pure function of the two inputs, so rebuilding the
    /// session for a redelivered notification yields an identical record.
    pub fn from_match(event: &CalendarEvent, milestone: &Milestone) -> Self {
        Self {
            session_id: session_key(&event.event_id, &milestone.milestone_id),
            milestone_id: milestone.milestone_id.clone(),
            title: milestone.title.clone(),
            event_name: event.name.clone(),
            user_id: event.user_id.clone(),
            category: event.category.clone().unwrap_or_default(),
            category_id: event
                .category_id
                .clone()
                .unwrap_or_else(|| milestone.category_id.clone()),
            start_date: event.start_date.clone(),
            duration_minutes: event.duration_minutes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(category: Option<&str>) -> CalendarEvent {
        CalendarEvent {
            event_id: "E1".into(),
            user_id: "u-1".into(),
            category: category.map(String::from),
            category_id: Some("C1".into()),
            name: "Write chapter 3".into(),
            start_date: "2026-03-02T09:00:00Z".into(),
            duration_minutes: 90,
        }
    }

    fn milestone() -> Milestone {
        Milestone {
            milestone_id: "M1".into(),
            title: "Finish the novel".into(),
            category_id: "C1".into(),
            user_id: "u-1".into(),
        }
    }

    #[test]
    fn notification_parses_snake_case_key() {
        let n = Notification::parse(r#"{"event_uid":"E1"}"#).unwrap();
        assert_eq!(n.event_id, "E1");
    }

    #[test]
    fn notification_accepts_producer_spelling() {
        let n = Notification::parse(r#"{"EventUID":"E9"}"#).unwrap();
        assert_eq!(n.event_id, "E9");
    }

    #[test]
    fn notification_rejects_garbage() {
        assert!(matches!(
            Notification::parse("{not json"),
            Err(NotificationError::Malformed(_))
        ));
        assert!(matches!(
            Notification::parse(r#"{"other":"E1"}"#),
            Err(NotificationError::Malformed(_))
        ));
    }

    #[test]
    fn notification_rejects_blank_event_id() {
        assert!(matches!(
            Notification::parse(r#"{"event_uid":"  "}"#),
            Err(NotificationError::MissingEventId)
        ));
    }

    #[test]
    fn empty_category_counts_as_unclassified() {
        assert!(event(None).classified_category().is_none());
        assert!(event(Some("")).classified_category().is_none());
        assert_eq!(event(Some("Writing")).classified_category(), Some("Writing"));
    }

    #[test]
    fn session_is_keyed_by_event_and_milestone() {
        let session = MilestoneSession::from_match(&event(Some("Writing")), &milestone());
        assert_eq!(session.session_id, "E1:M1");
        assert_eq!(session.title, "Finish the novel");
        assert_eq!(session.event_name, "Write chapter 3");
        assert_eq!(session.category, "Writing");
        assert_eq!(session.category_id, "C1");
        assert_eq!(session.duration_minutes, 90);
    }

    #[test]
    fn session_derivation_is_deterministic() {
        let a = MilestoneSession::from_match(&event(Some("Writing")), &milestone());
        let b = MilestoneSession::from_match(&event(Some("Writing")), &milestone());
        assert_eq!(a, b);
    }

    #[test]
    fn calendar_event_accepts_table_attribute_names() {
        let json = r#"{
            "event_uid": "E7",
            "user_id": "u-2",
            "category": "Fitness",
            "category_uid": "C7",
            "event_name": "Morning run",
            "event_startdate": "2026-01-05",
            "minutes": 45
        }"#;
        let event: CalendarEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.event_id, "E7");
        assert_eq!(event.category_key(), Some("C7"));
        assert_eq!(event.name, "Morning run");
        assert_eq!(event.duration_minutes, 45);
    }

    #[test]
    fn queue_message_uses_camel_case() {
        let msg: QueueMessage =
            serde_json::from_str(r#"{"messageId":"m-1","body":"{}"}"#).unwrap();
        assert_eq!(msg.message_id, "m-1");
    }

    #[test]
    fn queue_batch_reads_records_envelope() {
        let batch: QueueBatch = serde_json::from_str(
            r#"{"Records":[{"messageId":"a","body":"{\"event_uid\":\"E1\"}"}]}"#,
        )
        .unwrap();
        assert_eq!(batch.records.len(), 1);
        assert_eq!(
            Notification::parse(&batch.records[0].body).unwrap().event_id,
            "E1"
        );
    }
}
