//! The milestone-matching pipeline.
//!
//! [`NotificationProcessor`] runs one notification through lookup,
//! category gating, milestone fan-out, classification, and session writes.
//! [`BatchCoordinator`] drives a whole queue delivery and reports which
//! messages must be redelivered.

pub mod coordinator;
pub mod processor;

pub use coordinator::BatchCoordinator;
pub use processor::NotificationProcessor;
