//! Session CLI
//!
//! Command-line front end for a session-authenticated API:
//! 1. Loads config (TOML + env overlay)
//! 2. Restores the stored session, refreshing it when the access token expired
//! 3. Runs one command: login, whoami, request, or logout

mod cli;
mod commands;
mod config;

use anyhow::{Context, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Cli;
use crate::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // JSON logs on stderr so command output stays clean on stdout
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse(std::env::args().skip(1))?;

    let config_path = Config::resolve_path(cli.config_path.as_deref());
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        base_url = %config.api.base_url,
        credentials = %config.session.credentials_path.display(),
        headers = config.headers.len(),
        "configuration loaded"
    );

    let output = commands::run(&config, cli.command).await?;
    println!("{output}");
    Ok(())
}
