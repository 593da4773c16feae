use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use soundtrack_protocol::{DeviceAdvertisement, DeviceType};

use crate::DiscoveryError;
use crate::identity::validate_id;

/// A media server discovered on the local network.
///
/// The id is checked on construction and cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerResource {
    pub name: String,
    pub ip: IpAddr,
    id: String,
    pub stream_port: u16,
    pub comm_port: u16,
    pub rest_port: u16,
}

impl ServerResource {
    /// Creates a server record, rejecting ids that are neither empty nor ten
    /// alphanumeric characters.
    pub fn new(
        name: impl Into<String>,
        ip: IpAddr,
        id: impl Into<String>,
        stream_port: u16,
        comm_port: u16,
        rest_port: u16,
    ) -> Result<Self, DiscoveryError> {
        let id = id.into();
        validate_id(&id)?;
        Ok(Self {
            name: name.into(),
            ip,
            id,
            stream_port,
            comm_port,
            rest_port,
        })
    }

    /// Builds a server record from an advertisement received from `ip`.
    pub fn from_advertisement(
        adv: &DeviceAdvertisement,
        ip: IpAddr,
    ) -> Result<Self, DiscoveryError> {
        if adv.device_type != DeviceType::Server {
            return Err(DiscoveryError::NotServer(adv.device_type));
        }
        Self::new(
            adv.device_name.clone(),
            ip,
            adv.id.clone(),
            port("stream", adv.stream_port)?,
            port("comm", adv.comm_port)?,
            port("rest", adv.rest_port)?,
        )
    }

    /// Returns the advertisement this server sends about itself.
    pub fn to_advertisement(&self) -> DeviceAdvertisement {
        DeviceAdvertisement::new(
            DeviceType::Server,
            self.id.clone(),
            i32::from(self.stream_port),
            i32::from(self.comm_port),
            i32::from(self.rest_port),
            self.name.clone(),
        )
    }

    /// Device id; empty when the server has none.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn comm_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.comm_port)
    }

    pub fn stream_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.stream_port)
    }

    pub fn rest_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.rest_port)
    }
}

impl fmt::Display for ServerResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}:{}", self.name, self.ip, self.comm_port)?;
        if !self.id.is_empty() {
            write!(f, " ({})", self.id)?;
        }
        Ok(())
    }
}

fn port(field: &'static str, value: i32) -> Result<u16, DiscoveryError> {
    u16::try_from(value).map_err(|_| DiscoveryError::InvalidPort { field, value })
}

/// Progress of a poll, for display by whoever drives the receiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// A probe is about to be sent.
    Polling { attempt: u32, attempts: u32 },
    ServerFound(ServerResource),
    /// A socket operation failed; polling continues.
    SocketError(String),
    Finished { servers: usize },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::Polling { attempt, attempts } => {
                write!(f, "Searching for servers ({attempt}/{attempts})...")
            }
            StatusEvent::ServerFound(server) => write!(f, "Found {server}"),
            StatusEvent::SocketError(e) => write!(f, "Network error: {e}"),
            StatusEvent::Finished { servers: 0 } => write!(f, "No servers found"),
            StatusEvent::Finished { servers: 1 } => write!(f, "Found 1 server"),
            StatusEvent::Finished { servers } => write!(f, "Found {servers} servers"),
        }
    }
}

/// A raw datagram and its sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub from: SocketAddr,
    pub data: Vec<u8>,
}
