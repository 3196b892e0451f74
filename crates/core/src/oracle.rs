//! The classification oracle: does this event contribute to that milestone?
//!
//! The oracle is non-deterministic and answers in free text. Implementations
//! only transport the question; interpreting the answer is done once, here,
//! by [`Verdict::from_response`].

use async_trait::async_trait;

use crate::error::ProviderError;

/// The only reply that counts as a match. Compared byte-for-byte.
pub const AFFIRMATIVE_TOKEN: &str = "yes";

/// Capability interface for the external relevance classifier.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// A human-readable name for logs (e.g., "openai/gpt-4o").
    fn name(&self) -> &str;

    /// Ask whether `event_name` contributes to `milestone_title`.
    ///
    /// Returns the oracle's raw reply without trimming or normalisation.
    async fn classify(
        &self,
        event_name: &str,
        milestone_title: &str,
    ) -> std::result::Result<String, ProviderError>;
}

/// The interpreted answer for one (event, milestone) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Match,
    NoMatch,
}

impl Verdict {
    /// Exact, case-sensitive comparison against [`AFFIRMATIVE_TOKEN`].
    ///
    /// `"Yes"`, `"yes."`, `" yes"` and `""` are all `NoMatch`.
    pub fn from_response(response: &str) -> Self {
        if response == AFFIRMATIVE_TOKEN {
            Verdict::Match
        } else {
            Verdict::NoMatch
        }
    }

    pub fn is_match(self) -> bool {
        matches!(self, Verdict::Match)
    }
}
