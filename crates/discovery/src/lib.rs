//! Zero-configuration discovery of Sound Track media servers.
//!
//! A [`Receiver`] multicasts a probe and collects the advertisements that
//! servers send back; a [`Responder`] answers those probes on behalf of a
//! server. See `soundtrack_protocol::wire` for the record layouts.

pub mod client;
pub mod config;
pub mod identity;
pub mod server;
pub mod socket;
pub mod types;

use std::io;
use std::net::{Ipv4Addr, SocketAddr};

use soundtrack_protocol::DeviceType;

// Re-export primary types.
pub use client::Receiver;
pub use config::{DiscoveryConfig, ReceiverConfig, ResponderConfig};
pub use identity::{generate_id, validate_id};
pub use server::Responder;
pub use socket::{get_hostname, get_local_ips};
pub use types::{Datagram, ServerResource, StatusEvent};

/// Consecutive receive errors after which a socket is considered unusable.
pub(crate) const MAX_CONSECUTIVE_ERRORS: u32 = 16;

/// Errors for discovery operations.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to bind {role} socket on {addr}: {source}")]
    Bind {
        role: &'static str,
        addr: SocketAddr,
        source: io::Error,
    },

    #[error("failed to join multicast group {group}: {source}")]
    JoinMulticast { group: Ipv4Addr, source: io::Error },

    #[error("invalid device id {id:?}: {reason}")]
    InvalidId { id: String, reason: &'static str },

    #[error("invalid {field} port: {value}")]
    InvalidPort { field: &'static str, value: i32 },

    #[error("expected a server advertisement, got {0}")]
    NotServer(DeviceType),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,
}
