//! # pbar Core
//!
//! Domain types, traits, and error definitions for the milestone-matching
//! pipeline. This crate has **no I/O**. It defines the model that the store,
//! provider, and pipeline crates implement against.
//!
//! ## Layout
//!
//! Every external collaborator is a trait here:
//! - [`EventStore`], [`MilestoneIndex`], [`SessionStore`] for persistence
//! - [`Provider`] for raw LLM chat completions
//! - [`Classifier`] for the event/milestone relevance oracle
//!
//! Implementations live in their respective crates, so tests can swap any of
//! them for deterministic stubs.

pub mod error;
pub mod event;
pub mod message;
pub mod model;
pub mod oracle;
pub mod outcome;
pub mod provider;
pub mod store;

// Re-export key types at crate root for ergonomics
pub use error::{NotificationError, ProviderError, StoreError};
pub use event::{DomainEvent, EventBus};
pub use message::{Message, Role};
pub use model::{
    CalendarEvent, Milestone, MilestoneSession, Notification, QueueBatch, QueueMessage, session_key,
};
pub use oracle::{AFFIRMATIVE_TOKEN, Classifier, Verdict};
pub use outcome::{
    BatchItemFailure, BatchReport, BatchResponse, Completion, DropReason, ItemOutcome, ItemReport,
    MatchTally, RetryReason,
};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use store::{EventStore, MilestoneIndex, SessionStore};
