//! `pbar status` — Show effective configuration.

use std::path::Path;

use pbar_config::AppConfig;

use super::context;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = context::load_config(config_path)?;

    println!("pbar Status");
    println!("===========");
    println!("  Config dir:    {}", AppConfig::config_dir().display());
    println!("  Provider:      {}", config.default_provider);
    println!("  Model:         {}", config.default_model);
    println!("  Temperature:   {}", config.classifier.temperature);
    println!("  Oracle limit:  {} in flight, {}s timeout", config.classifier.max_concurrent_requests, config.classifier.timeout_secs);
    println!("  Store:         {}", config.store.backend);
    if config.store.backend == "sqlite" {
        println!("  Database:      {}", config.store.resolved_path().display());
    }
    println!(
        "  Pipeline:      {} notifications × {} milestones, {}s deadline",
        config.pipeline.max_concurrent_notifications,
        config.pipeline.max_concurrent_milestones,
        config.pipeline.batch_deadline_secs
    );
    println!("  Gateway:       {}:{}", config.gateway.host, config.gateway.port);
    println!("  Log format:    {}", config.logging.format);

    if config_path.exists() {
        println!("\n  ✅ Config file found");
    } else {
        println!("\n  ⚠️  No config file — run `pbar onboard` first");
    }

    Ok(())
}
