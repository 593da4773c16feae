//! UDP socket setup shared by the receiver and the responder.
//!
//! Every socket is opened with `SO_REUSEADDR` so a receiver and a responder
//! can share the multicast port on one host.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, warn};

use crate::{DiscoveryError, MAX_CONSECUTIVE_ERRORS};

/// Environment variable that forces the interface used for multicast.
pub const MULTICAST_IF_ENV: &str = "SOUNDTRACK_MULTICAST_IF";

/// Consecutive receive failures on one socket. A success resets the count.
#[derive(Debug, Default)]
pub(crate) struct ErrorStreak(u32);

impl ErrorStreak {
    pub(crate) fn reset(&mut self) {
        self.0 = 0;
    }

    /// Records a failure. Returns true once the socket should be given up on.
    pub(crate) fn fail(&mut self) -> bool {
        self.0 = self.0.saturating_add(1);
        self.0 >= MAX_CONSECUTIVE_ERRORS
    }

    pub(crate) fn count(&self) -> u32 {
        self.0
    }
}

/// Binds a unicast UDP socket on all interfaces.
///
/// Must be called from within a Tokio runtime.
pub(crate) fn bind_udp(role: &'static str, port: u16) -> Result<UdpSocket, DiscoveryError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let socket = open(addr).map_err(|source| DiscoveryError::Bind { role, addr, source })?;
    into_tokio(role, addr, socket)
}

/// Binds a UDP socket on `port` and joins `group`.
///
/// With no interface given (and no [`MULTICAST_IF_ENV`] override) the group
/// is joined on every eligible interface; a failure on one interface is
/// tolerated as long as another accepts the join. Multicast loopback is
/// enabled and the TTL is 1. Must be called from within a Tokio runtime.
pub(crate) fn bind_multicast(
    role: &'static str,
    group: Ipv4Addr,
    port: u16,
    interface: Option<Ipv4Addr>,
) -> Result<UdpSocket, DiscoveryError> {
    let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port));
    let socket = open(addr).map_err(|source| DiscoveryError::Bind { role, addr, source })?;

    let interfaces = multicast_interfaces(interface);
    join_group(&socket, group, &interfaces)?;

    if let Some(iface) = interfaces.first() {
        socket.set_multicast_if_v4(iface)?;
    }
    socket.set_multicast_loop_v4(true)?;
    socket.set_multicast_ttl_v4(1)?;

    into_tokio(role, addr, socket)
}

fn open(addr: SocketAddr) -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.set_nonblocking(true)?;
    Ok(socket)
}

fn into_tokio(
    role: &'static str,
    addr: SocketAddr,
    socket: Socket,
) -> Result<UdpSocket, DiscoveryError> {
    let socket = UdpSocket::from_std(socket.into())?;
    debug!(role, %addr, local = ?socket.local_addr().ok(), "UDP socket bound");
    Ok(socket)
}

fn join_group(
    socket: &Socket,
    group: Ipv4Addr,
    interfaces: &[Ipv4Addr],
) -> Result<(), DiscoveryError> {
    if interfaces.is_empty() {
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .map_err(|source| DiscoveryError::JoinMulticast { group, source })?;
        debug!(%group, "joined multicast group on default interface");
        return Ok(());
    }

    let mut joined = 0;
    let mut last_error = None;
    for iface in interfaces {
        match socket.join_multicast_v4(&group, iface) {
            Ok(()) => {
                joined += 1;
                debug!(%group, %iface, "joined multicast group");
            }
            // Two addresses on the same NIC.
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                joined += 1;
                debug!(%group, %iface, "multicast group already joined");
            }
            Err(e) => {
                debug!(%group, %iface, "multicast join failed (non-fatal): {e}");
                last_error = Some(e);
            }
        }
    }

    if joined == 0 {
        let source = last_error
            .unwrap_or_else(|| io::Error::other("no interface accepted the multicast join"));
        return Err(DiscoveryError::JoinMulticast { group, source });
    }
    Ok(())
}

/// Resolves the interfaces to join the multicast group on.
///
/// [`MULTICAST_IF_ENV`] wins over `configured`; with neither set, every
/// non-loopback, non-link-local IPv4 interface is used.
pub fn multicast_interfaces(configured: Option<Ipv4Addr>) -> Vec<Ipv4Addr> {
    if let Ok(var) = std::env::var(MULTICAST_IF_ENV) {
        match var.parse::<Ipv4Addr>() {
            Ok(addr) => {
                debug!(%addr, "using {MULTICAST_IF_ENV} override");
                return vec![addr];
            }
            Err(_) => warn!(value = %var, "ignoring invalid {MULTICAST_IF_ENV}"),
        }
    }

    if let Some(addr) = configured {
        return vec![addr];
    }

    get_local_ips()
        .into_iter()
        .filter_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .collect()
}

/// Returns local non-loopback IPv4 addresses, excluding link-local (169.254.x.x).
pub fn get_local_ips() -> Vec<IpAddr> {
    let mut ips = Vec::new();

    let Ok(interfaces) = if_addrs::get_if_addrs() else {
        return ips;
    };

    for iface in interfaces {
        if iface.is_loopback() {
            continue;
        }
        if let IpAddr::V4(ipv4) = iface.ip() {
            if ipv4.is_loopback() || ipv4.is_link_local() {
                continue;
            }
            ips.push(IpAddr::V4(ipv4));
        }
    }

    ips
}

/// Returns the local host name, used as the default server name.
pub fn get_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .map(|h| h.trim_end_matches('.').to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "Sound Track Server".into())
}
