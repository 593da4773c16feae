//! Command-line arguments.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use soundtrack_discovery::DiscoveryConfig;

/// Sound Track discovery node
#[derive(Parser, Debug)]
#[command(name = "soundtrack-node")]
#[command(version)]
#[command(about = "Poll for Sound Track servers or answer discovery probes")]
pub struct Args {
    /// JSON configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Probe for servers and print the ones that answer
    Poll {
        /// Number of probes to send
        #[arg(long)]
        attempts: Option<u32>,

        /// Listen time after each probe, in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Answer probes until interrupted
    Serve {
        /// Advertised server name
        #[arg(long)]
        name: Option<String>,

        /// Advertised server id (generated when empty)
        #[arg(long)]
        id: Option<String>,
    },
}

impl Args {
    /// Overrides configuration values with the ones given on the command line.
    pub fn apply(&self, config: &mut DiscoveryConfig) {
        match &self.command {
            Command::Poll {
                attempts,
                timeout_ms,
                ..
            } => {
                if let Some(attempts) = attempts {
                    config.receiver.poll_attempts = *attempts;
                }
                if let Some(timeout_ms) = timeout_ms {
                    config.receiver.poll_timeout_ms = *timeout_ms;
                }
            }
            Command::Serve { name, id } => {
                if let Some(name) = name {
                    config.responder.name = name.clone();
                }
                if let Some(id) = id {
                    config.responder.id = id.clone();
                }
            }
        }
    }
}
