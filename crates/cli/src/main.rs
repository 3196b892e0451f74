//! pbar CLI — the main entry point.
//!
//! Commands:
//! - `onboard`  — Write a default config
//! - `serve`    — Start the HTTP gateway that receives queue batches
//! - `process`  — Run one batch from a file or stdin
//! - `seed`     — Load events and milestones from a JSON fixture
//! - `sessions` — List sessions recorded for a milestone
//! - `status`   — Show effective configuration
//! - `doctor`   — Diagnose config, store, and provider health

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "pbar",
    about = "pbar — match calendar events to user milestones",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    /// Config file (default: ~/.pbar/config.toml)
    #[arg(short, long, global = true, env = "PBAR_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Onboard,

    /// Start the HTTP gateway
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Process one batch and print the redelivery list
    Process {
        /// Batch file; reads stdin when omitted
        file: Option<PathBuf>,
    },

    /// Load events and milestones from a JSON fixture
    Seed {
        #[arg(short, long)]
        file: PathBuf,
    },

    /// List sessions recorded for a milestone
    Sessions {
        #[arg(short, long)]
        milestone: String,
    },

    /// Show effective configuration
    Status,

    /// Diagnose system health
    Doctor {
        /// Skip the provider reachability check
        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = commands::context::config_path(cli.config.as_deref());

    // Logs go to stderr so `process` output stays machine-readable.
    let json = cli.json
        || pbar_config::AppConfig::load_from(&config_path)
            .is_ok_and(|c| c.logging.format == "json");
    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Onboard => commands::onboard::run(&config_path).await?,
        Commands::Serve { port } => commands::serve::run(&config_path, port).await?,
        Commands::Process { file } => commands::process::run(&config_path, file).await?,
        Commands::Seed { file } => commands::seed::run(&config_path, &file).await?,
        Commands::Sessions { milestone } => {
            commands::sessions::run(&config_path, &milestone).await?
        }
        Commands::Status => commands::status::run(&config_path).await?,
        Commands::Doctor { offline } => commands::doctor::run(&config_path, offline).await?,
    }

    Ok(())
}
