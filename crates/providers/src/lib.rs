//! LLM provider implementations for pbar.
//!
//! All providers implement the `pbar_core::Provider` trait.
//! The router selects the configured backend; [`LlmClassifier`] turns it into
//! the event/milestone relevance oracle.

pub mod classifier;
pub mod openai_compat;
pub mod router;

pub use classifier::{DEFAULT_SYSTEM_PROMPT, LlmClassifier, user_prompt};
pub use openai_compat::OpenAiCompatProvider;
pub use router::{ProviderRouter, build_from_config};
