use std::io;
use std::net::{IpAddr, SocketAddr, SocketAddrV4};
use std::time::{Duration, Instant};

use soundtrack_protocol::wire::{ADVERTISEMENT_LEN, MIN_ADVERTISEMENT_DATAGRAM};
use soundtrack_protocol::{DeviceAdvertisement, DeviceType, Probe};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::DiscoveryError;
use crate::config::ReceiverConfig;
use crate::socket::{ErrorStreak, bind_multicast, bind_udp};
use crate::types::{ServerResource, StatusEvent};

/// Below this much remaining budget an attempt stops receiving.
const MIN_RECEIVE_WINDOW: Duration = Duration::from_millis(2);

/// Finds media servers by multicasting probes and collecting their replies.
///
/// Owns two sockets: one on the multicast port, joined to the group, that
/// probes are sent from, and one on the comm port that replies arrive on.
/// Both are released when the receiver is dropped.
pub struct Receiver {
    config: ReceiverConfig,
    multicast: UdpSocket,
    comm: UdpSocket,
    group_addr: SocketAddrV4,
    events_tx: mpsc::Sender<StatusEvent>,
    events_rx: Option<mpsc::Receiver<StatusEvent>>,
}

impl Receiver {
    /// Binds both sockets and joins the multicast group.
    ///
    /// Must be called from within a Tokio runtime. If the comm socket cannot
    /// be bound, the multicast socket is closed before the error is returned.
    pub fn bind(config: ReceiverConfig) -> Result<Self, DiscoveryError> {
        let multicast = bind_multicast(
            "multicast",
            config.multicast_group,
            config.multicast_port,
            config.multicast_interface,
        )?;
        let comm = bind_udp("comm", config.comm_port)?;

        // Port 0 binds an ephemeral port; probes go to whatever was bound.
        let group_port = match config.multicast_port {
            0 => multicast.local_addr()?.port(),
            port => port,
        };
        let group_addr = SocketAddrV4::new(config.multicast_group, group_port);

        info!(group = %group_addr, comm = ?comm.local_addr().ok(), "discovery receiver bound");

        let (tx, rx) = mpsc::channel(16);
        Ok(Self {
            config,
            multicast,
            comm,
            group_addr,
            events_tx: tx,
            events_rx: Some(rx),
        })
    }

    /// Takes the status event receiver. Can only be called once.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<StatusEvent>> {
        self.events_rx.take()
    }

    /// Port replies are received on, as advertised in each probe.
    pub fn comm_port(&self) -> Result<u16, DiscoveryError> {
        Ok(self.comm.local_addr()?.port())
    }

    /// Address probes are sent to.
    pub fn group_addr(&self) -> SocketAddrV4 {
        self.group_addr
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    /// Polls with the configured attempt count and timeout.
    pub async fn poll_default(&self) -> Result<Vec<ServerResource>, DiscoveryError> {
        self.poll_servers(self.config.poll_attempts, self.config.poll_timeout())
            .await
    }

    /// Probes for servers `attempts` times, listening `timeout` after each probe.
    ///
    /// Returns every server that answered, one entry per source address. An
    /// empty list means nobody answered; the call returns after roughly
    /// `attempts * timeout` either way. Only an unusable comm socket turns
    /// into an error.
    pub async fn poll_servers(
        &self,
        attempts: u32,
        timeout: Duration,
    ) -> Result<Vec<ServerResource>, DiscoveryError> {
        self.poll_servers_until(attempts, timeout, &CancellationToken::new())
            .await
    }

    /// Like [`poll_servers`](Self::poll_servers), but stops with
    /// [`DiscoveryError::Cancelled`] as soon as `cancel` fires.
    pub async fn poll_servers_until(
        &self,
        attempts: u32,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Vec<ServerResource>, DiscoveryError> {
        let attempts = attempts.max(1);
        let response_port = self.comm_port()?;
        let mut servers = Vec::new();
        let mut buf = [0u8; ADVERTISEMENT_LEN];
        let mut errors = ErrorStreak::default();

        for attempt in 1..=attempts {
            self.emit(StatusEvent::Polling { attempt, attempts });
            self.send_probe(response_port).await;

            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining <= MIN_RECEIVE_WINDOW {
                    break;
                }

                // Zeroed so a datagram shorter than a full record never picks
                // up bytes from the previous one.
                buf.fill(0);
                let received = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DiscoveryError::Cancelled),
                    result = tokio::time::timeout(remaining, self.comm.recv_from(&mut buf)) => result,
                };

                match received {
                    // Budget for this attempt is spent.
                    Err(_) => break,
                    Ok(Ok((len, from))) => {
                        errors.reset();
                        if let Some(server) = collect_advertisement(&buf, len, from, &mut servers)
                        {
                            info!(%server, "server discovered");
                            self.emit(StatusEvent::ServerFound(server));
                        }
                    }
                    Ok(Err(e)) => self.receive_failed(attempt, e, &mut errors)?,
                }
            }
        }

        debug!(servers = servers.len(), attempts, "poll finished");
        self.emit(StatusEvent::Finished {
            servers: servers.len(),
        });
        Ok(servers)
    }

    /// Multicasts one probe. A failed send is reported, not returned: the
    /// attempt still listens in case a server heard an earlier probe.
    async fn send_probe(&self, response_port: u16) {
        let probe = Probe::new(i32::from(response_port)).encode();
        match self
            .multicast
            .send_to(&probe, SocketAddr::V4(self.group_addr))
            .await
        {
            Ok(_) => debug!(group = %self.group_addr, response_port, "probe sent"),
            Err(e) => {
                warn!(group = %self.group_addr, "failed to send probe: {e}");
                self.emit(StatusEvent::SocketError(e.to_string()));
            }
        }
    }

    /// Reports a receive error and keeps polling, unless the comm socket has
    /// failed too many times in a row.
    fn receive_failed(
        &self,
        attempt: u32,
        e: io::Error,
        errors: &mut ErrorStreak,
    ) -> Result<(), DiscoveryError> {
        warn!(attempt, failures = errors.count() + 1, "discovery receive failed: {e}");
        self.emit(StatusEvent::SocketError(e.to_string()));
        if errors.fail() {
            return Err(e.into());
        }
        Ok(())
    }

    fn emit(&self, event: StatusEvent) {
        let _ = self.events_tx.try_send(event);
    }
}

/// Turns one received datagram into a new server entry.
///
/// `buf` is the whole receive buffer and `len` the number of bytes the
/// datagram filled. Returns the server if it was added to `servers`.
fn collect_advertisement(
    buf: &[u8],
    len: usize,
    from: SocketAddr,
    servers: &mut Vec<ServerResource>,
) -> Option<ServerResource> {
    if len < MIN_ADVERTISEMENT_DATAGRAM {
        debug!(%from, len, "ignoring short datagram");
        return None;
    }

    let adv = DeviceAdvertisement::decode(buf);
    if !adv.is_well_formed() {
        debug!(%from, "ignoring malformed advertisement");
        return None;
    }
    if adv.device_type != DeviceType::Server {
        debug!(%from, device_type = %adv.device_type, "ignoring non-server advertisement");
        return None;
    }

    let ip: IpAddr = from.ip();
    if servers.iter().any(|s| s.ip == ip) {
        debug!(%from, "duplicate advertisement");
        return None;
    }

    match ServerResource::from_advertisement(&adv, ip) {
        Ok(server) => {
            servers.push(server.clone());
            Some(server)
        }
        Err(e) => {
            warn!(%from, "rejecting advertisement: {e}");
            None
        }
    }
}
