//! Discovery configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes. A port of `0` binds an ephemeral port; the port actually bound
//! is the one that goes on the wire.

use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use soundtrack_protocol::constants::{
    DEFAULT_CLIENT_COMM_PORT, DEFAULT_MULTICAST_PORT, DEFAULT_REST_PORT,
    DEFAULT_SERVER_COMM_RX_PORT, DEFAULT_SERVER_COMM_TX_PORT, DEFAULT_STREAM_PORT,
    MULTICAST_GROUP,
};

use crate::DiscoveryError;
use crate::socket::get_hostname;

/// Settings for a [`Receiver`](crate::Receiver).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReceiverConfig {
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// Port advertisements are received on.
    pub comm_port: u16,
    /// Interface to join the group on. `None` joins on every eligible
    /// interface.
    pub multicast_interface: Option<Ipv4Addr>,
    pub poll_attempts: u32,
    pub poll_timeout_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            multicast_group: MULTICAST_GROUP,
            multicast_port: DEFAULT_MULTICAST_PORT,
            comm_port: DEFAULT_CLIENT_COMM_PORT,
            multicast_interface: None,
            poll_attempts: 3,
            poll_timeout_ms: 1000,
        }
    }
}

impl ReceiverConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Settings for a [`Responder`](crate::Responder).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResponderConfig {
    /// Advertised server name.
    pub name: String,
    /// Advertised server id. Empty leaves it unset.
    pub id: String,
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// Port advertisements are sent from; advertised as the comm port.
    pub comm_tx_port: u16,
    /// Port direct messages are received on.
    pub comm_rx_port: u16,
    pub stream_port: u16,
    pub rest_port: u16,
    pub multicast_interface: Option<Ipv4Addr>,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            name: get_hostname(),
            id: String::new(),
            multicast_group: MULTICAST_GROUP,
            multicast_port: DEFAULT_MULTICAST_PORT,
            comm_tx_port: DEFAULT_SERVER_COMM_TX_PORT,
            comm_rx_port: DEFAULT_SERVER_COMM_RX_PORT,
            stream_port: DEFAULT_STREAM_PORT,
            rest_port: DEFAULT_REST_PORT,
            multicast_interface: None,
        }
    }
}

/// Both halves of the discovery configuration, as stored on disk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub receiver: ReceiverConfig,
    pub responder: ResponderConfig,
}

impl DiscoveryConfig {
    /// Loads configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self, DiscoveryError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DiscoveryError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_json(&content)?;
        tracing::debug!(path = %path.display(), "discovery configuration loaded");
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self, DiscoveryError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DiscoveryError::Config(format!("invalid configuration: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<(), DiscoveryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| DiscoveryError::Config(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Rejects settings no socket could be opened with.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        for group in [
            self.receiver.multicast_group,
            self.responder.multicast_group,
        ] {
            if !group.is_multicast() {
                return Err(DiscoveryError::Config(format!(
                    "{group} is not a multicast address"
                )));
            }
        }
        if self.receiver.poll_attempts == 0 {
            return Err(DiscoveryError::Config(
                "pollAttempts must be at least 1".into(),
            ));
        }
        crate::identity::validate_id(&self.responder.id)
    }
}
