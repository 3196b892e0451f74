//! LLM-backed relevance classifier.
//!
//! Wraps any [`Provider`] into the [`Classifier`] capability: one system
//! instruction, one user question per (event, milestone) pair, raw reply back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pbar_core::error::ProviderError;
use pbar_core::message::Message;
use pbar_core::oracle::Classifier;
use pbar_core::provider::{Provider, ProviderRequest};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::router::build_from_config;

/// Built-in system instruction.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a highly precise classifier. \
Your task is to determine if a given calendar event directly contributes to a specific user-defined Project. \
You will be given the description of one calendar event and the name of one project. \
Respond only with 'yes' if the event clearly helps progress the project, or 'unknown' if it does not or the relationship is unclear.\n\
**Your response must be only one word: \"yes\" or \"unknown\".**";

/// The per-pair question.
pub fn user_prompt(event_name: &str, milestone_title: &str) -> String {
    format!(
        "Calendar Event: {event_name}\nProject: {milestone_title}\nDoes this event contribute to this project?"
    )
}

/// A [`Classifier`] that asks a chat-completion provider.
pub struct LlmClassifier {
    label: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    system_prompt: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl LlmClassifier {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            label: format!("{}/{}", provider.name(), model),
            provider,
            model,
            temperature: 0.0,
            max_tokens: Some(4),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            timeout: Duration::from_secs(30),
            permits: Arc::new(Semaphore::new(8)),
        }
    }

    /// Build the classifier for the configured default provider.
    pub fn from_config(config: &pbar_config::AppConfig) -> Result<Self, ProviderError> {
        let router = build_from_config(config)?;
        let provider = router
            .default()
            .ok_or_else(|| ProviderError::NotConfigured(config.default_provider.clone()))?;

        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());

        let settings = &config.classifier;
        let mut classifier = Self::new(provider, model)
            .with_temperature(settings.temperature)
            .with_max_tokens(settings.max_tokens)
            .with_timeout(Duration::from_secs(settings.timeout_secs))
            .with_max_concurrent_requests(settings.max_concurrent_requests);

        if let Some(prompt) = &settings.system_prompt {
            classifier = classifier.with_system_prompt(prompt);
        }

        Ok(classifier)
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// `0` leaves the provider's own limit in place.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = (max_tokens > 0).then_some(max_tokens);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_concurrent_requests(mut self, limit: usize) -> Self {
        self.permits = Arc::new(Semaphore::new(limit.max(1)));
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider(&self) -> &Arc<dyn Provider> {
        &self.provider
    }

    fn request(&self, event_name: &str, milestone_title: &str) -> ProviderRequest {
        ProviderRequest {
            model: self.model.clone(),
            // Instruction first, question last: the model answers the final
            // user turn.
            messages: vec![
                Message::system(&self.system_prompt),
                Message::user(user_prompt(event_name, milestone_title)),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

#[async_trait]
impl Classifier for LlmClassifier {
    fn name(&self) -> &str {
        &self.label
    }

    async fn classify(
        &self,
        event_name: &str,
        milestone_title: &str,
    ) -> std::result::Result<String, ProviderError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ProviderError::NotConfigured(format!("classifier closed: {e}")))?;

        let request = self.request(event_name, milestone_title);
        let response = tokio::time::timeout(self.timeout, self.provider.complete(request))
            .await
            .map_err(|_| {
                warn!(classifier = %self.label, timeout_secs = self.timeout.as_secs(), "Oracle call timed out");
                ProviderError::Timeout(format!("{} after {:?}", self.label, self.timeout))
            })??;

        debug!(
            classifier = %self.label,
            event = event_name,
            milestone = milestone_title,
            reply = %response.message.content,
            "Oracle replied"
        );

        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pbar_core::message::Role;
    use pbar_core::provider::ProviderResponse;
    use pbar_core::Verdict;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replies with a fixed string and remembers every request.
    struct ScriptedProvider {
        reply: String,
        requests: Mutex<Vec<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.into(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let model = request.model.clone();
            self.requests.lock().unwrap().push(request);
            Ok(ProviderResponse {
                message: Message::assistant(&self.reply),
                usage: None,
                model,
            })
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl Provider for FailingProvider {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            Err(ProviderError::RateLimited { retry_after_secs: 3 })
        }
    }

    /// Never answers within any reasonable timeout; tracks peak concurrency.
    struct SlowProvider {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Provider for SlowProvider {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(
            &self,
            request: ProviderRequest,
        ) -> std::result::Result<ProviderResponse, ProviderError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ProviderResponse {
                message: Message::assistant("unknown"),
                usage: None,
                model: request.model,
            })
        }
    }

    #[tokio::test]
    async fn sends_system_then_user_prompt() {
        let provider = Arc::new(ScriptedProvider::new("yes"));
        let classifier = LlmClassifier::new(provider.clone(), "gpt-4o");

        let reply = classifier.classify("Gym session", "Run a marathon").await.unwrap();
        assert_eq!(reply, "yes");

        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4o");
        assert_eq!(request.max_tokens, Some(4));
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(request.messages[1].role, Role::User);
        assert_eq!(
            request.messages[1].content,
            "Calendar Event: Gym session\nProject: Run a marathon\nDoes this event contribute to this project?"
        );
    }

    #[tokio::test]
    async fn reply_is_returned_verbatim() {
        let provider = Arc::new(ScriptedProvider::new("Yes."));
        let classifier = LlmClassifier::new(provider, "gpt-4o");

        let reply = classifier.classify("a", "b").await.unwrap();
        assert_eq!(reply, "Yes.");
        assert_eq!(Verdict::from_response(&reply), Verdict::NoMatch);
    }

    #[tokio::test]
    async fn custom_system_prompt_replaces_default() {
        let provider = Arc::new(ScriptedProvider::new("unknown"));
        let classifier =
            LlmClassifier::new(provider.clone(), "m").with_system_prompt("Answer yes or unknown.");

        classifier.classify("a", "b").await.unwrap();
        let requests = provider.requests.lock().unwrap();
        assert_eq!(requests[0].messages[0].content, "Answer yes or unknown.");
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let classifier = LlmClassifier::new(Arc::new(FailingProvider), "m");
        let err = classifier.classify("a", "b").await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { retry_after_secs: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_times_out() {
        let provider = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_secs(60),
        });
        let classifier =
            LlmClassifier::new(provider, "m").with_timeout(Duration::from_secs(5));

        let err = classifier.classify("a", "b").await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_calls_are_capped() {
        let provider = Arc::new(SlowProvider {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            delay: Duration::from_millis(100),
        });
        let classifier = Arc::new(
            LlmClassifier::new(provider.clone(), "m").with_max_concurrent_requests(2),
        );

        let mut handles = Vec::new();
        for i in 0..6 {
            let classifier = classifier.clone();
            handles.push(tokio::spawn(async move {
                classifier.classify(&format!("event {i}"), "goal").await
            }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), "unknown");
        }

        assert_eq!(provider.peak.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn from_config_uses_provider_model_override() {
        let mut config = pbar_config::AppConfig::default();
        config.providers.insert(
            "openai".into(),
            pbar_config::ProviderConfig {
                api_key: Some("sk-test".into()),
                api_url: None,
                default_model: Some("gpt-4o-mini".into()),
            },
        );
        let classifier = LlmClassifier::from_config(&config).unwrap();
        assert_eq!(classifier.model(), "gpt-4o-mini");
        assert_eq!(classifier.name(), "openai/gpt-4o-mini");
    }
}
