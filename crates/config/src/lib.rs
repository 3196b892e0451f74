//! Configuration loading, validation, and management for pbar.
//!
//! Loads configuration from `~/.pbar/config.toml` with environment
//! variable overrides. Validates all settings at startup; the resulting
//! [`AppConfig`] is built once and handed to every component.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.pbar/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// LLM provider backing the classifier
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Model used for classification
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Classifier settings
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Store backend settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Batch processing settings
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Log output settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("classifier", &self.classifier)
            .field("store", &self.store)
            .field("pipeline", &self.pipeline)
            .field("gateway", &self.gateway)
            .field("logging", &self.logging)
            .field("providers", &self.providers)
            .finish()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// The reply is a single word; anything longer is a non-match anyway.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Per-request timeout for one oracle call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// In-flight oracle requests allowed across the whole process
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Replace the built-in system instruction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

fn default_temperature() -> f32 {
    0.0
}
fn default_max_tokens() -> u32 {
    4
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_max_concurrent_requests() -> usize {
    8
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
            max_concurrent_requests: default_max_concurrent_requests(),
            system_prompt: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// "sqlite" or "memory"
    #[serde(default = "default_store_backend")]
    pub backend: String,

    /// SQLite database path; defaults to `~/.pbar/pbar.sqlite`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

fn default_store_backend() -> String {
    "sqlite".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_store_backend(),
            path: None,
        }
    }
}

impl StoreConfig {
    /// The SQLite path to open, falling back to the config directory.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| AppConfig::config_dir().join("pbar.sqlite"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Notifications processed concurrently within one batch
    #[serde(default = "default_max_concurrent_notifications")]
    pub max_concurrent_notifications: usize,

    /// Milestones of one event classified concurrently
    #[serde(default = "default_max_concurrent_milestones")]
    pub max_concurrent_milestones: usize,

    /// Wall-clock budget for a whole batch
    #[serde(default = "default_batch_deadline_secs")]
    pub batch_deadline_secs: u64,
}

fn default_max_concurrent_notifications() -> usize {
    10
}
fn default_max_concurrent_milestones() -> usize {
    4
}
fn default_batch_deadline_secs() -> u64 {
    840
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_notifications: default_max_concurrent_notifications(),
            max_concurrent_milestones: default_max_concurrent_milestones(),
            batch_deadline_secs: default_batch_deadline_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

fn default_port() -> u16 {
    42618
}
fn default_host() -> String {
    "127.0.0.1".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_format() -> String {
    "pretty".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: default_log_format(),
        }
    }
}

const STORE_BACKENDS: &[&str] = &["sqlite", "memory"];
const LOG_FORMATS: &[&str] = &["pretty", "json"];

/// Upper bound for `pipeline.batch_deadline_secs` (one day).
const MAX_BATCH_DEADLINE_SECS: u64 = 24 * 60 * 60;

impl AppConfig {
    /// Load configuration from the default path (~/.pbar/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    ///
    /// API key lookup order when the file sets none:
    /// - `PBAR_API_KEY`
    /// - `OPENAI_API_KEY`
    /// - `OPENAPI_KEY`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("PBAR_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok())
                .or_else(|| std::env::var("OPENAPI_KEY").ok());
        }

        if let Ok(provider) = std::env::var("PBAR_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("PBAR_MODEL") {
            config.default_model = model;
        }

        if let Ok(path) = std::env::var("PBAR_DATABASE") {
            config.store.path = Some(path);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".pbar")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.classifier.temperature) {
            return Err(ConfigError::ValidationError(
                "classifier.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.classifier.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "classifier.timeout_secs must be > 0".into(),
            ));
        }

        if self.classifier.max_concurrent_requests == 0
            || self.pipeline.max_concurrent_notifications == 0
            || self.pipeline.max_concurrent_milestones == 0
        {
            return Err(ConfigError::ValidationError(
                "concurrency limits must be > 0".into(),
            ));
        }

        if self.pipeline.batch_deadline_secs == 0
            || self.pipeline.batch_deadline_secs > MAX_BATCH_DEADLINE_SECS
        {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.batch_deadline_secs must be between 1 and {MAX_BATCH_DEADLINE_SECS}"
            )));
        }

        if !STORE_BACKENDS.contains(&self.store.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown store.backend '{}' (expected one of: {})",
                self.store.backend,
                STORE_BACKENDS.join(", ")
            )));
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown logging.format '{}'",
                self.logging.format
            )));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            classifier: ClassifierConfig::default(),
            store: StoreConfig::default(),
            pipeline: PipelineConfig::default(),
            gateway: GatewayConfig::default(),
            logging: LoggingConfig::default(),
            providers: HashMap::new(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_provider, "openai");
        assert_eq!(config.default_model, "gpt-4o");
        assert_eq!(config.store.backend, "sqlite");
    }

    #[test]
    fn config_roundtrip_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.default_model, config.default_model);
        assert_eq!(
            parsed.pipeline.batch_deadline_secs,
            config.pipeline.batch_deadline_secs
        );
    }

    #[test]
    fn invalid_temperature_rejected() {
        let mut config = AppConfig::default();
        config.classifier.temperature = 5.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_concurrency_rejected() {
        let mut config = AppConfig::default();
        config.pipeline.max_concurrent_milestones = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn batch_deadline_is_bounded() {
        let mut config = AppConfig::default();
        config.pipeline.batch_deadline_secs = i64::MAX as u64;
        assert!(config.validate().is_err());

        config.pipeline.batch_deadline_secs = MAX_BATCH_DEADLINE_SECS;
        assert!(config.validate().is_ok());

        config.pipeline.batch_deadline_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_backend_rejected() {
        let mut config = AppConfig::default();
        config.store.backend = "dynamo".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dynamo"));
    }

    #[test]
    fn missing_config_file_returns_defaults() {
        let result = AppConfig::load_from(Path::new("/nonexistent/config.toml"));
        assert!(result.is_ok());
        assert_eq!(result.unwrap().default_provider, "openai");
    }

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
default_model = "gpt-4o-mini"

[pipeline]
max_concurrent_notifications = 3

[store]
backend = "memory"
"#
        )
        .unwrap();

        let config = AppConfig::load_from(file.path()).unwrap();
        assert_eq!(config.default_model, "gpt-4o-mini");
        assert_eq!(config.pipeline.max_concurrent_notifications, 3);
        assert_eq!(config.pipeline.max_concurrent_milestones, 4);
        assert_eq!(config.store.backend, "memory");
        assert_eq!(config.classifier.timeout_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "default_model = [").unwrap();
        assert!(matches!(
            AppConfig::load_from(file.path()),
            Err(ConfigError::ParseError { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_api_key() {
        let config = AppConfig {
            api_key: Some("sk-secret".into()),
            ..AppConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn provider_scoped_key_counts_as_configured() {
        let mut config = AppConfig::default();
        assert!(!config.has_api_key());
        config.providers.insert(
            "openai".into(),
            ProviderConfig {
                api_key: Some("sk-test".into()),
                api_url: None,
                default_model: None,
            },
        );
        assert!(config.has_api_key());
    }

    #[test]
    fn default_toml_generation() {
        let toml_str = AppConfig::default_toml();
        assert!(toml_str.contains("gpt-4o"));
        assert!(toml_str.contains("batch_deadline_secs"));
    }
}
