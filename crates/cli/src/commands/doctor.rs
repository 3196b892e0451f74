//! `pbar doctor` — Diagnose system health.

use std::path::Path;

use pbar_config::AppConfig;
use pbar_core::store::SessionStore;
use pbar_providers::router::build_from_config;

use super::context;

pub async fn run(config_path: &Path, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 pbar Doctor — System Diagnostics");
    println!("==================================\n");

    let mut issues = 0;

    if config_path.exists() {
        println!("  ✅ Config file found: {}", config_path.display());
    } else {
        println!("  ⚠️  No config file at {} — using defaults", config_path.display());
    }

    let config = match AppConfig::load_with_env(config_path) {
        Ok(config) => {
            println!("  ✅ Config valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config and re-run.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else if config.default_provider == "ollama" {
        println!("  ✅ Provider ollama needs no API key");
    } else {
        println!("  ⚠️  No API key — set api_key in config.toml or export OPENAI_API_KEY");
        issues += 1;
    }

    match context::open_stores(&config).await {
        Ok(stores) => match stores.sessions.count().await {
            Ok(count) => println!("  ✅ {} store reachable ({count} session(s))", stores.backend),
            Err(e) => {
                println!("  ❌ {} store query failed: {e}", stores.backend);
                issues += 1;
            }
        },
        Err(e) => {
            println!("  ❌ Store unavailable: {e}");
            issues += 1;
        }
    }

    if offline {
        println!("  ⏭️  Provider check skipped (--offline)");
    } else {
        match build_from_config(&config) {
            Ok(router) => match router.default() {
                Some(provider) => match provider.health_check().await {
                    Ok(true) => println!("  ✅ Provider {} reachable", provider.name()),
                    Ok(false) => {
                        println!("  ❌ Provider {} rejected the health check", provider.name());
                        issues += 1;
                    }
                    Err(e) => {
                        println!("  ❌ Provider {} unreachable: {e}", provider.name());
                        issues += 1;
                    }
                },
                None => {
                    println!("  ❌ No provider registered for {}", config.default_provider);
                    issues += 1;
                }
            },
            Err(e) => {
                println!("  ❌ {e}");
                issues += 1;
            }
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
