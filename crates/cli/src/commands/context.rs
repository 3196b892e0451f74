//! Process-wide wiring shared by the commands.
//!
//! Config, stores, and the classifier are built once here and handed to the
//! pipeline; nothing downstream re-reads configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use pbar_config::AppConfig;
use pbar_core::error::StoreError;
use pbar_core::event::EventBus;
use pbar_core::store::{EventStore, MilestoneIndex, SessionStore};
use pbar_pipeline::{BatchCoordinator, NotificationProcessor};
use pbar_providers::LlmClassifier;
use pbar_stores::{InMemoryStore, Seed, SqliteStore};
use tracing::{info, warn};

/// `--config` if given, else `~/.pbar/config.toml`.
pub fn config_path(override_path: Option<&Path>) -> PathBuf {
    override_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| AppConfig::config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load_with_env(path).map_err(|e| format!("Failed to load config: {e}"))?)
}

/// One backend viewed through every store trait.
#[derive(Clone)]
pub struct Stores {
    pub backend: &'static str,
    pub events: Arc<dyn EventStore>,
    pub milestones: Arc<dyn MilestoneIndex>,
    pub sessions: Arc<dyn SessionStore>,
    pub seed: Arc<dyn Seed>,
}

impl Stores {
    fn share<S>(backend: &'static str, store: S) -> Self
    where
        S: EventStore + MilestoneIndex + SessionStore + Seed + 'static,
    {
        let store = Arc::new(store);
        Self {
            backend,
            events: store.clone(),
            milestones: store.clone(),
            sessions: store.clone(),
            seed: store,
        }
    }
}

pub async fn open_stores(config: &AppConfig) -> Result<Stores, StoreError> {
    match config.store.backend.as_str() {
        "memory" => {
            warn!("Using the in-memory store; nothing will persist");
            Ok(Stores::share("memory", InMemoryStore::new()))
        }
        _ => {
            let path = config.store.resolved_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
            let store = SqliteStore::new(&path.to_string_lossy()).await?;
            Ok(Stores::share("sqlite", store))
        }
    }
}

/// Build the coordinator with the configured classifier and limits.
pub fn build_coordinator(
    config: &AppConfig,
    stores: &Stores,
    event_bus: Arc<EventBus>,
) -> Result<BatchCoordinator, Box<dyn std::error::Error>> {
    if !config.has_api_key() && config.default_provider != "ollama" {
        warn!(provider = %config.default_provider, "No API key configured; oracle calls will fail");
    }

    let classifier = LlmClassifier::from_config(config)?;
    info!(classifier = %pbar_core::Classifier::name(&classifier), "Classifier ready");

    let processor = NotificationProcessor::new(
        stores.events.clone(),
        stores.milestones.clone(),
        stores.sessions.clone(),
        Arc::new(classifier),
    )
    .with_event_bus(event_bus)
    .with_max_concurrent_milestones(config.pipeline.max_concurrent_milestones);

    Ok(BatchCoordinator::from_config(
        Arc::new(processor),
        &config.pipeline,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_path_wins() {
        let path = config_path(Some(Path::new("/etc/pbar.toml")));
        assert_eq!(path, PathBuf::from("/etc/pbar.toml"));
    }

    #[test]
    fn default_config_path_is_under_config_dir() {
        assert!(config_path(None).ends_with(".pbar/config.toml"));
    }

    #[tokio::test]
    async fn memory_backend_opens_without_disk() {
        let mut config = AppConfig::default();
        config.store.backend = "memory".into();
        let stores = open_stores(&config).await.unwrap();
        assert_eq!(stores.backend, "memory");
        assert_eq!(stores.sessions.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sqlite_backend_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.store.path = Some(
            dir.path()
                .join("nested/pbar.sqlite")
                .to_string_lossy()
                .to_string(),
        );
        let stores = open_stores(&config).await.unwrap();
        assert_eq!(stores.backend, "sqlite");
        assert!(dir.path().join("nested").exists());
    }

    #[test]
    fn coordinator_builds_from_default_config() {
        let config = AppConfig::default();
        let store = InMemoryStore::new();
        let stores = Stores::share("memory", store);
        assert!(build_coordinator(&config, &stores, Arc::new(EventBus::default())).is_ok());
    }
}
