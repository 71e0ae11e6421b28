mod api;
mod cli;
mod config;
mod download;
mod error;
mod events;
mod install;
mod interactive;
mod models;
mod resolve;
mod shim;
mod utils;
mod version_manager;

use anyhow::Result;
use clap::Parser;
use cli::Cli;
use config::Config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    cli.run(config).await?;
    Ok(())
}
