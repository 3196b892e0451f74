//! Provider router: selects the LLM backend named in config.

use std::collections::HashMap;
use std::sync::Arc;

use pbar_core::error::ProviderError;
use pbar_core::provider::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Routes LLM requests to the correct provider.
pub struct ProviderRouter {
    providers: HashMap<String, Arc<dyn Provider>>,
    default_provider: String,
}

impl ProviderRouter {
    /// Create a new router with a default provider.
    pub fn new(default_provider: impl Into<String>) -> Self {
        Self {
            providers: HashMap::new(),
            default_provider: default_provider.into(),
        }
    }

    /// Register a provider.
    pub fn register(&mut self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        self.providers.insert(name.into(), provider);
    }

    /// Get the default provider.
    pub fn default(&self) -> Option<Arc<dyn Provider>> {
        self.providers.get(&self.default_provider).cloned()
    }

    /// Get a specific provider by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }
}

/// Build providers from configuration.
///
/// The default provider is always registered, even when the `[providers]`
/// table does not mention it. A provider without an `api_url` must be one of
/// the well-known names.
pub fn build_from_config(config: &pbar_config::AppConfig) -> Result<ProviderRouter, ProviderError> {
    let mut router = ProviderRouter::new(&config.default_provider);
    let timeout = std::time::Duration::from_secs(config.classifier.timeout_secs);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = match &provider_config.api_url {
            Some(url) => url.clone(),
            None => known_base_url(name)?,
        };

        let provider = OpenAiCompatProvider::new(name, &base_url, &api_key).with_timeout(timeout);
        router.register(name.clone(), Arc::new(provider));
    }

    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = known_base_url(&config.default_provider)?;
        let provider =
            OpenAiCompatProvider::new(&config.default_provider, &base_url, &api_key)
                .with_timeout(timeout);
        router.register(config.default_provider.clone(), Arc::new(provider));
    }

    Ok(router)
}

/// Base URL for well-known OpenAI-compatible providers.
fn known_base_url(provider_name: &str) -> Result<String, ProviderError> {
    let url = match provider_name {
        "openai" => "https://api.openai.com/v1",
        "openrouter" => "https://openrouter.ai/api/v1",
        "ollama" => "http://localhost:11434/v1",
        "deepseek" => "https://api.deepseek.com/v1",
        "groq" => "https://api.groq.com/openai/v1",
        "together" => "https://api.together.xyz/v1",
        "vllm" => "http://localhost:8000/v1",
        _ => {
            return Err(ProviderError::NotConfigured(format!(
                "unknown provider '{provider_name}'; set providers.{provider_name}.api_url"
            )));
        }
    };
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn router_register_and_lookup() {
        let mut router = ProviderRouter::new("openai");
        let provider = Arc::new(OpenAiCompatProvider::openai("sk-test"));
        router.register("openai", provider);

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn known_base_urls() {
        assert!(known_base_url("openrouter").unwrap().contains("openrouter.ai"));
        assert!(known_base_url("openai").unwrap().contains("api.openai.com"));
        assert!(known_base_url("ollama").unwrap().contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = pbar_config::AppConfig::default();
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.default().unwrap().name(), "openai");
    }

    #[test]
    fn unknown_default_provider_without_url_is_rejected() {
        let mut config = pbar_config::AppConfig::default();
        config.default_provider = "opneai".into();
        assert!(matches!(
            build_from_config(&config),
            Err(ProviderError::NotConfigured(msg)) if msg.contains("opneai")
        ));
    }

    #[test]
    fn unknown_provider_with_explicit_url_is_accepted() {
        let mut config = pbar_config::AppConfig::default();
        config.default_provider = "internal".into();
        config.providers.insert(
            "internal".into(),
            pbar_config::ProviderConfig {
                api_key: Some("sk-test".into()),
                api_url: Some("https://llm.internal/v1".into()),
                default_model: None,
            },
        );
        let router = build_from_config(&config).unwrap();
        assert_eq!(router.default().unwrap().name(), "internal");
    }

    #[test]
    fn configured_providers_are_all_registered() {
        let mut config = pbar_config::AppConfig::default();
        config.default_provider = "ollama".into();
        config.providers.insert(
            "ollama".into(),
            pbar_config::ProviderConfig {
                api_key: None,
                api_url: Some("http://gpu-box:11434/v1".into()),
                default_model: Some("llama3".into()),
            },
        );
        let router = build_from_config(&config).unwrap();
        assert!(router.get("openai").is_none());
        assert_eq!(router.default().unwrap().name(), "ollama");
    }
}
