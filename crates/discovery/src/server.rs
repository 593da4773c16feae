use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use soundtrack_protocol::wire::{ADVERTISEMENT_LEN, PROBE_LEN};
use soundtrack_protocol::{DeviceAdvertisement, DeviceType, Probe};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::DiscoveryError;
use crate::config::ResponderConfig;
use crate::identity::validate_id;
use crate::socket::{ErrorStreak, bind_multicast, bind_udp};
use crate::types::Datagram;

const QUEUE_CAPACITY: usize = 64;

/// Large enough for any probe plus trailing junk worth logging.
const RECV_BUFFER_LEN: usize = 512;

type RequesterSlot = Arc<Mutex<Option<SocketAddr>>>;

/// Answers discovery probes on behalf of a media server.
///
/// Binding opens three sockets: the multicast socket probes arrive on, the
/// comm-tx socket replies are sent from, and the comm-rx socket direct
/// messages arrive on. The advertisement is encoded once at bind time.
pub struct Responder {
    config: ResponderConfig,
    multicast: Arc<UdpSocket>,
    comm_tx: Arc<UdpSocket>,
    comm_rx: Arc<UdpSocket>,
    advertisement: Arc<[u8; ADVERTISEMENT_LEN]>,
    last_requester: RequesterSlot,
    direct_tx: mpsc::Sender<Datagram>,
    direct_rx: Option<mpsc::Receiver<Datagram>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Responder {
    /// Binds the sockets and prepares the advertisement.
    ///
    /// The advertised comm port is the port the comm-tx socket actually
    /// bound. Fails on an invalid server id before any socket is opened.
    pub fn bind(config: ResponderConfig) -> Result<Self, DiscoveryError> {
        validate_id(&config.id)?;

        let multicast = bind_multicast(
            "multicast",
            config.multicast_group,
            config.multicast_port,
            config.multicast_interface,
        )?;
        let comm_tx = bind_udp("comm-tx", config.comm_tx_port)?;
        let comm_rx = bind_udp("comm-rx", config.comm_rx_port)?;

        let advertisement = DeviceAdvertisement::new(
            DeviceType::Server,
            config.id.clone(),
            i32::from(config.stream_port),
            i32::from(comm_tx.local_addr()?.port()),
            i32::from(config.rest_port),
            config.name.clone(),
        )
        .encode();

        let (direct_tx, direct_rx) = mpsc::channel(QUEUE_CAPACITY);
        Ok(Self {
            config,
            multicast: Arc::new(multicast),
            comm_tx: Arc::new(comm_tx),
            comm_rx: Arc::new(comm_rx),
            advertisement: Arc::new(advertisement),
            last_requester: Arc::new(Mutex::new(None)),
            direct_tx,
            direct_rx: Some(direct_rx),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// Starts answering probes.
    ///
    /// Safe to call multiple times: a running responder is stopped before
    /// the tasks are spawned again. Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> Result<(), DiscoveryError> {
        self.stop();

        let (probe_tx, probe_rx) = mpsc::channel(QUEUE_CAPACITY);
        self.tasks.push(tokio::spawn(receive_loop(
            "multicast",
            Arc::clone(&self.multicast),
            probe_tx,
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(answer_probes(
            probe_rx,
            Arc::clone(&self.comm_tx),
            Arc::clone(&self.advertisement),
            Arc::clone(&self.last_requester),
            self.cancel.clone(),
        )));
        self.tasks.push(tokio::spawn(receive_loop(
            "comm-rx",
            Arc::clone(&self.comm_rx),
            self.direct_tx.clone(),
            self.cancel.clone(),
        )));

        info!(
            name = %self.config.name,
            port = ?self.multicast.local_addr().ok(),
            "discovery responder started"
        );
        Ok(())
    }

    /// Stops answering probes. The sockets stay bound until the responder
    /// is dropped, so it can be started again.
    pub fn stop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.cancel = CancellationToken::new();
        debug!("discovery responder stopped");
    }

    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }

    /// Starts the responder and runs until the cancellation token is triggered.
    pub async fn run_context(&mut self, cancel: CancellationToken) -> Result<(), DiscoveryError> {
        self.start()?;
        cancel.cancelled().await;
        self.stop();
        Ok(())
    }

    /// Address the most recent well-formed probe asked for a reply on.
    pub fn last_requester(&self) -> Option<SocketAddr> {
        *self
            .last_requester
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the receiver for datagrams arriving on the comm-rx socket.
    /// Can only be called once.
    pub fn take_direct_messages(&mut self) -> Option<mpsc::Receiver<Datagram>> {
        self.direct_rx.take()
    }

    pub fn multicast_port(&self) -> Result<u16, DiscoveryError> {
        Ok(self.multicast.local_addr()?.port())
    }

    pub fn comm_tx_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.comm_tx.local_addr()?)
    }

    pub fn comm_rx_addr(&self) -> Result<SocketAddr, DiscoveryError> {
        Ok(self.comm_rx.local_addr()?)
    }

    /// The advertisement exactly as it is sent.
    pub fn advertisement_bytes(&self) -> &[u8; ADVERTISEMENT_LEN] {
        &self.advertisement
    }

    pub fn advertisement(&self) -> DeviceAdvertisement {
        DeviceAdvertisement::decode(&self.advertisement[..])
    }

    pub fn config(&self) -> &ResponderConfig {
        &self.config
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Receives datagrams on `socket` and queues them without inspecting them.
async fn receive_loop(
    role: &'static str,
    socket: Arc<UdpSocket>,
    queue: mpsc::Sender<Datagram>,
    cancel: CancellationToken,
) {
    let mut buf = [0u8; RECV_BUFFER_LEN];
    let mut errors = ErrorStreak::default();

    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            result = socket.recv_from(&mut buf) => result,
        };

        match received {
            Ok((len, from)) => {
                errors.reset();
                let datagram = Datagram {
                    from,
                    data: buf[..len].to_vec(),
                };
                if queue.try_send(datagram).is_err() {
                    debug!(role, %from, "queue full or closed, dropping datagram");
                }
            }
            Err(e) => {
                warn!(role, "receive failed: {e}");
                if errors.fail() {
                    error!(role, failures = errors.count(), "giving up on socket");
                    return;
                }
            }
        }
    }
}

async fn answer_probes(
    mut probes: mpsc::Receiver<Datagram>,
    comm_tx: Arc<UdpSocket>,
    advertisement: Arc<[u8; ADVERTISEMENT_LEN]>,
    last_requester: RequesterSlot,
    cancel: CancellationToken,
) {
    loop {
        let datagram = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            next = probes.recv() => match next {
                Some(d) => d,
                None => return,
            },
        };

        let Some(requester) = requester_addr(&datagram) else {
            continue;
        };
        *last_requester
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(requester);

        match comm_tx.send_to(&advertisement[..], requester).await {
            Ok(_) => debug!(%requester, "advertisement sent"),
            Err(e) => warn!(%requester, "failed to send advertisement: {e}"),
        }
    }
}

/// Where to send the advertisement for a probe, if the datagram is one.
fn requester_addr(datagram: &Datagram) -> Option<SocketAddr> {
    let from = datagram.from;
    if datagram.data.len() < PROBE_LEN {
        debug!(%from, len = datagram.data.len(), "ignoring short datagram");
        return None;
    }

    let probe = Probe::decode(&datagram.data);
    if !probe.is_well_formed() {
        debug!(%from, "ignoring malformed probe");
        return None;
    }

    match u16::try_from(probe.response_port) {
        Ok(port) if port != 0 => Some(SocketAddr::new(from.ip(), port)),
        _ => {
            debug!(%from, port = probe.response_port, "ignoring probe with invalid port");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::time::Duration;

    use super::*;

    fn test_config(id: &str) -> ResponderConfig {
        ResponderConfig {
            name: "Den".into(),
            id: id.into(),
            multicast_port: 0,
            comm_tx_port: 0,
            comm_rx_port: 0,
            stream_port: 2251,
            rest_port: 2249,
            multicast_interface: Some(Ipv4Addr::LOCALHOST),
            ..Default::default()
        }
    }

    fn datagram(data: &[u8]) -> Datagram {
        Datagram {
            from: SocketAddr::from(([192, 168, 1, 7], 2250)),
            data: data.to_vec(),
        }
    }

    async fn probe_and_wait(
        responder: &Responder,
        requester: &UdpSocket,
        payload: &[u8],
    ) -> Option<(Vec<u8>, SocketAddr)> {
        let target = SocketAddr::from(([127, 0, 0, 1], responder.multicast_port().unwrap()));
        requester.send_to(payload, target).await.unwrap();

        let mut buf = [0u8; 1024];
        match tokio::time::timeout(Duration::from_millis(500), requester.recv_from(&mut buf)).await
        {
            Ok(Ok((len, from))) => Some((buf[..len].to_vec(), from)),
            _ => None,
        }
    }

    #[test]
    fn requester_from_probe() {
        let probe = Probe::new(4000).encode();
        assert_eq!(
            requester_addr(&datagram(&probe)),
            Some(SocketAddr::from(([192, 168, 1, 7], 4000)))
        );
    }

    #[test]
    fn requester_ignores_garbage() {
        assert_eq!(requester_addr(&datagram(b"soundtrack")), None);

        let mut bad_tag = Probe::new(4000).encode();
        bad_tag[3] = b'X';
        assert_eq!(requester_addr(&datagram(&bad_tag)), None);

        assert_eq!(requester_addr(&datagram(&Probe::new(0).encode())), None);
        assert_eq!(requester_addr(&datagram(&Probe::new(70_000).encode())), None);
        assert_eq!(requester_addr(&datagram(&Probe::new(-1).encode())), None);
    }

    #[tokio::test]
    async fn bind_rejects_invalid_id() {
        let result = Responder::bind(test_config("short"));
        assert!(matches!(result, Err(DiscoveryError::InvalidId { .. })));
    }

    #[tokio::test]
    async fn advertisement_uses_bound_comm_port() {
        let responder = Responder::bind(test_config("Ab3dE6gH9k")).unwrap();
        let adv = responder.advertisement();
        assert!(adv.is_well_formed());
        assert_eq!(adv.device_type, DeviceType::Server);
        assert_eq!(adv.id, "Ab3dE6gH9k");
        assert_eq!(adv.device_name, "Den");
        assert_eq!(adv.stream_port, 2251);
        assert_eq!(adv.rest_port, 2249);
        assert_eq!(
            adv.comm_port,
            i32::from(responder.comm_tx_addr().unwrap().port())
        );
        assert_eq!(responder.advertisement_bytes().len(), ADVERTISEMENT_LEN);
    }

    #[tokio::test]
    async fn answers_probe_with_advertisement() {
        let mut responder = Responder::bind(test_config("Ab3dE6gH9k")).unwrap();
        responder.start().unwrap();
        assert!(responder.is_running());

        let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = requester.local_addr().unwrap().port();
        let probe = Probe::new(i32::from(port)).encode();

        let (reply, from) = probe_and_wait(&responder, &requester, &probe)
            .await
            .expect("no advertisement received");
        assert_eq!(reply.as_slice(), &responder.advertisement_bytes()[..]);
        assert_eq!(from.port(), responder.comm_tx_addr().unwrap().port());
        assert_eq!(
            responder.last_requester(),
            Some(SocketAddr::from(([127, 0, 0, 1], port)))
        );
    }

    #[tokio::test]
    async fn answers_each_requester_and_keeps_last() {
        let mut responder = Responder::bind(test_config("Ab3dE6gH9k")).unwrap();
        responder.start().unwrap();

        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let first_addr = first.local_addr().unwrap();
        let second_addr = second.local_addr().unwrap();

        for requester in [&first, &second] {
            let port = requester.local_addr().unwrap().port();
            let (reply, _) = probe_and_wait(
                &responder,
                requester,
                &Probe::new(i32::from(port)).encode(),
            )
            .await
            .expect("no advertisement received");
            assert_eq!(reply.as_slice(), &responder.advertisement_bytes()[..]);
        }

        assert_ne!(first_addr, second_addr);
        assert_eq!(responder.last_requester(), Some(second_addr));
    }

    #[tokio::test]
    async fn back_to_back_requests_are_all_answered() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        responder.start().unwrap();

        let first = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let second = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = SocketAddr::from(([127, 0, 0, 1], responder.multicast_port().unwrap()));
        for requester in [&first, &second] {
            let port = requester.local_addr().unwrap().port();
            requester
                .send_to(&Probe::new(i32::from(port)).encode(), target)
                .await
                .unwrap();
        }

        let mut buf = [0u8; 1024];
        for requester in [&first, &second] {
            let (len, _) =
                tokio::time::timeout(Duration::from_millis(500), requester.recv_from(&mut buf))
                    .await
                    .expect("no advertisement received")
                    .unwrap();
            assert_eq!(&buf[..len], &responder.advertisement_bytes()[..]);
        }
        assert!(responder.last_requester().is_some());
    }

    #[tokio::test]
    async fn malformed_probe_is_ignored_and_next_is_answered() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        responder.start().unwrap();

        let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = requester.local_addr().unwrap().port();

        let mut bad = Probe::new(i32::from(port)).encode();
        bad[0] = b'S';
        assert!(probe_and_wait(&responder, &requester, &bad).await.is_none());
        assert_eq!(responder.last_requester(), None);

        let good = Probe::new(i32::from(port)).encode();
        let (reply, _) = probe_and_wait(&responder, &requester, &good)
            .await
            .expect("no advertisement received");
        assert_eq!(DeviceAdvertisement::decode(&reply).device_name, "Den");
    }

    #[tokio::test]
    async fn stopped_responder_does_not_answer() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        responder.start().unwrap();
        responder.stop();
        responder.stop();
        assert!(!responder.is_running());

        let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = requester.local_addr().unwrap().port();
        let probe = Probe::new(i32::from(port)).encode();
        assert!(probe_and_wait(&responder, &requester, &probe).await.is_none());
    }

    #[tokio::test]
    async fn restart_answers_again() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        responder.start().unwrap();
        responder.start().unwrap();
        assert_eq!(responder.tasks.len(), 3);

        let requester = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = requester.local_addr().unwrap().port();
        let probe = Probe::new(i32::from(port)).encode();
        assert!(probe_and_wait(&responder, &requester, &probe).await.is_some());
    }

    #[tokio::test]
    async fn direct_messages_are_passed_through() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        let mut direct = responder.take_direct_messages().unwrap();
        assert!(responder.take_direct_messages().is_none());
        responder.start().unwrap();

        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let target = SocketAddr::from(([127, 0, 0, 1], responder.comm_rx_addr().unwrap().port()));
        sender.send_to(b"\x07anything", target).await.unwrap();

        let datagram = tokio::time::timeout(Duration::from_millis(500), direct.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(datagram.data, b"\x07anything");
        assert_eq!(datagram.from, sender.local_addr().unwrap());
    }

    #[tokio::test]
    async fn run_context_stops_on_cancel() {
        let mut responder = Responder::bind(test_config("")).unwrap();
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), responder.run_context(cancel))
            .await
            .unwrap()
            .unwrap();
        assert!(!responder.is_running());
    }

    #[tokio::test]
    #[ignore = "requires multicast loopback"]
    async fn receiver_finds_responder_over_multicast() {
        use crate::Receiver;
        use crate::config::ReceiverConfig;

        let mut config = test_config("Ab3dE6gH9k");
        config.multicast_port = 42250;
        config.multicast_interface = None;
        let mut responder = Responder::bind(config).unwrap();
        responder.start().unwrap();

        let receiver = Receiver::bind(ReceiverConfig {
            multicast_port: 42250,
            comm_port: 0,
            ..Default::default()
        })
        .unwrap();
        let servers = receiver
            .poll_servers(2, Duration::from_millis(500))
            .await
            .unwrap();

        assert!(servers.iter().any(|s| s.name == "Den" && s.id() == "Ab3dE6gH9k"));
    }
}
