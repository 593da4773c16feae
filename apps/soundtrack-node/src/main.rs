//! Sound Track discovery node entry point.

mod app;
mod cli;

use clap::Parser;
use soundtrack_discovery::DiscoveryConfig;
use tracing_subscriber::EnvFilter;

use crate::cli::{Args, Command};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,soundtrack=debug")),
        )
        .init();

    let args = Args::parse();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        command = ?args.command,
        "starting Sound Track node"
    );

    let mut config = match &args.config {
        Some(path) => DiscoveryConfig::load(path)?,
        None => DiscoveryConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let rt = tokio::runtime::Runtime::new()?;
    match args.command {
        Command::Poll { json, .. } => rt.block_on(app::poll(config.receiver, json))?,
        Command::Serve { .. } => rt.block_on(app::serve(config.responder))?,
    }

    tracing::info!("node shut down cleanly");
    Ok(())
}
