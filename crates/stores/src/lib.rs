//! Store backends for pbar.
//!
//! Every backend implements all three store traits from `pbar_core`
//! ([`EventStore`](pbar_core::EventStore), [`MilestoneIndex`](pbar_core::MilestoneIndex),
//! [`SessionStore`](pbar_core::SessionStore)) plus [`Seed`] for loading
//! fixture data.

pub mod fixtures;
pub mod in_memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use fixtures::{Fixtures, Seed};
pub use in_memory::InMemoryStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
