//! `pbar onboard` — First-time setup.

use std::path::Path;

use pbar_config::AppConfig;

pub async fn run(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("pbar — First-Time Setup");
    println!("=======================\n");

    if let Some(config_dir) = config_path.parent() {
        if !config_dir.exists() {
            std::fs::create_dir_all(config_dir)?;
            println!("✅ Created config directory: {}", config_dir.display());
        } else {
            println!("  Config directory exists: {}", config_dir.display());
        }
    }

    if config_path.exists() {
        println!("\n⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set api_key in {} (or export OPENAI_API_KEY)", config_path.display());
    println!("   2. Run: pbar seed --file fixtures.json");
    println!("   3. Run: pbar serve\n");

    Ok(())
}
