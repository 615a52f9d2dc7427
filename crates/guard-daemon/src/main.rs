//! Trade guardrail service - entry point.

use anyhow::Result;
use clap::Parser;
use guard_daemon::config::{CONFIG_ENV, DEFAULT_CONFIG_PATH};
use tracing::info;

/// Autonomous trade guardrail and conditional execution engine
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via GUARD_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    guard_telemetry::init_logging()?;

    info!("Starting guard-daemon v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > GUARD_CONFIG > default path
    let config = match args.config {
        Some(path) => {
            info!(config_path = %path, "Loading configuration");
            guard_daemon::AppConfig::from_file(&path)?
        }
        None => {
            let path =
                std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
            info!(config_path = %path, "Loading configuration");
            guard_daemon::AppConfig::load()?
        }
    };
    info!(
        users = config.engine.risk.users.len(),
        api_enabled = config.api.enabled,
        "Configuration loaded"
    );

    let app = guard_daemon::Application::new(config)?;
    app.run().await?;

    Ok(())
}
