//! `pbar serve` — Start the HTTP gateway.

use std::path::Path;
use std::sync::Arc;

use pbar_core::event::EventBus;

use super::context;

pub async fn run(config_path: &Path, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = context::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    let stores = context::open_stores(&config).await?;
    let coordinator = context::build_coordinator(&config, &stores, Arc::new(EventBus::default()))?;

    println!("pbar gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Store:     {}", stores.backend);
    println!("   Model:     {}/{}", config.default_provider, config.default_model);

    pbar_gateway::start(&config.gateway, Arc::new(coordinator), stores.sessions).await?;

    Ok(())
}
