//! # Session Layer
//!
//! A [`Session`] is one logical client connection. It owns exactly one active
//! transport at a time (two, briefly, while upgrading), drives the heartbeat,
//! and hands every `message` packet to its [`SessionHandler`].
//!
//! ## State Machine
//! ```text
//! Connecting -> Open -> Upgrading -> Upgraded
//!                 |  <-(abandon)-|       |
//!                 +--> Closing ----------+--> Closed
//! ```
//!
//! All transitions are serialized behind one per-session lock. The lock is
//! never held across an `.await` nor while user handlers run.

pub mod heartbeat;
pub mod registry;
mod upgrade;

use crate::core::codec::Frame;
use crate::core::packet::{OpenPayload, Packet};
use crate::core::payload;
use crate::error::{ProtocolError, Result};
use crate::transport::{PollingTransport, SocketTransport, Transport, TransportId, TransportKind};
use crate::utils::metrics::Metrics;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

pub use heartbeat::Heartbeat;
pub use registry::SessionRegistry;

/// Observable session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Open,
    Upgrading,
    Upgraded,
    /// A server `close` is queued on a polling transport, waiting for the next pull
    Closing,
    Closed,
}

/// Why a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a `close` packet
    ClientClose,
    /// Closed by application code
    ServerClose,
    /// Closed because the whole server is shutting down
    ServerShutdown,
    PingTimeout,
    /// No namespace connection within the connect timeout
    ConnectTimeout,
    TransportClosed,
    TransportError,
    DecodeError,
}

impl CloseReason {
    /// Server-initiated closes announce themselves with a `close` packet
    fn sends_close_packet(self) -> bool {
        matches!(self, CloseReason::ServerClose | CloseReason::ServerShutdown)
    }
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            CloseReason::ClientClose => "client close",
            CloseReason::ServerClose => "server close",
            CloseReason::ServerShutdown => "server shutdown",
            CloseReason::PingTimeout => "ping timeout",
            CloseReason::ConnectTimeout => "connect timeout",
            CloseReason::TransportClosed => "transport close",
            CloseReason::TransportError => "transport error",
            CloseReason::DecodeError => "parse error",
        };
        f.write_str(text)
    }
}

/// Receives the traffic of one session.
///
/// Callbacks run without the session lock held, so they may call back into
/// [`Session::send`] or [`Session::close`].
pub trait SessionHandler: Send + Sync {
    fn on_open(&self, _session: &Arc<Session>) {}

    /// A `message` packet (text or binary) arrived on the canonical transport.
    /// Returning a fatal error closes the session.
    fn on_message(&self, session: &Arc<Session>, packet: Packet) -> Result<()>;

    /// Called on every heartbeat tick
    fn on_tick(&self, _session: &Arc<Session>) {}

    fn on_close(&self, _session: &Arc<Session>, _reason: CloseReason) {}
}

/// Per-session timing and limits, fixed at handshake
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub ping_interval: Duration,
    pub ping_timeout: Duration,
    pub max_payload: usize,
    /// Transport names this session may upgrade to
    pub upgrades: Vec<String>,
}

enum Link {
    Connecting(Transport),
    Open(Transport),
    Upgrading {
        old: PollingTransport,
        new: SocketTransport,
        probed: bool,
    },
    Upgraded(SocketTransport),
    Closing {
        polling: PollingTransport,
        reason: CloseReason,
    },
    Closed,
}

impl Link {
    fn state(&self) -> SessionState {
        match self {
            Link::Connecting(_) => SessionState::Connecting,
            Link::Open(_) => SessionState::Open,
            Link::Upgrading { .. } => SessionState::Upgrading,
            Link::Upgraded(_) => SessionState::Upgraded,
            Link::Closing { .. } => SessionState::Closing,
            Link::Closed => SessionState::Closed,
        }
    }

    /// The transport outbound packets currently go through
    fn canonical_id(&self) -> Option<TransportId> {
        match self {
            Link::Connecting(t) | Link::Open(t) => Some(t.id()),
            Link::Upgrading { old, .. } => Some(old.id()),
            Link::Upgraded(s) => Some(s.id()),
            Link::Closing { polling, .. } => Some(polling.id()),
            Link::Closed => None,
        }
    }

    fn polling(&self) -> Option<&PollingTransport> {
        match self {
            Link::Connecting(t) | Link::Open(t) => t.as_polling(),
            Link::Upgrading { old, .. } => Some(old),
            Link::Closing { polling, .. } => Some(polling),
            Link::Upgraded(_) | Link::Closed => None,
        }
    }

    fn into_transports(self) -> Vec<Transport> {
        match self {
            Link::Connecting(t) | Link::Open(t) => vec![t],
            Link::Upgrading { old, new, .. } => {
                vec![Transport::Polling(old), Transport::Socket(new)]
            }
            Link::Upgraded(s) => vec![Transport::Socket(s)],
            Link::Closing { polling, .. } => vec![Transport::Polling(polling)],
            Link::Closed => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Canonical,
    Probe,
    Stale,
}

/// One logical client connection
pub struct Session {
    id: String,
    origin: TransportKind,
    config: SessionConfig,
    link: Mutex<Link>,
    heartbeat: Arc<Heartbeat>,
    cancel: CancellationToken,
    handler: Arc<dyn SessionHandler>,
    registry: registry::WeakRegistry,
    metrics: Arc<Metrics>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("origin", &self.origin)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Build a session around its first transport.
    ///
    /// `make_handler` receives a weak reference to the session being built, so
    /// the handler can send without creating a reference cycle.
    pub fn new<F>(
        id: String,
        transport: Transport,
        config: SessionConfig,
        registry: &SessionRegistry,
        metrics: Arc<Metrics>,
        make_handler: F,
    ) -> Arc<Self>
    where
        F: FnOnce(Weak<Session>) -> Arc<dyn SessionHandler>,
    {
        Arc::new_cyclic(|weak| Session {
            id,
            origin: transport.kind(),
            config,
            link: Mutex::new(Link::Connecting(transport)),
            heartbeat: Arc::new(Heartbeat::new()),
            cancel: CancellationToken::new(),
            handler: make_handler(weak.clone()),
            registry: registry.downgrade(),
            metrics,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Transport the session was opened with
    pub fn origin(&self) -> TransportKind {
        self.origin
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.link.lock().state()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    /// Kind of the transport currently carrying outbound packets
    pub fn transport_kind(&self) -> Option<TransportKind> {
        match &*self.link.lock() {
            Link::Connecting(t) | Link::Open(t) => Some(t.kind()),
            Link::Upgrading { .. } | Link::Closing { .. } => Some(TransportKind::Polling),
            Link::Upgraded(_) => Some(TransportKind::Websocket),
            Link::Closed => None,
        }
    }

    /// Cancelled once the session closes
    pub fn closed(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Send the `open` packet and start the heartbeat
    pub fn open(self: &Arc<Self>) -> Result<()> {
        {
            let mut link = self.link.lock();
            let transport = match std::mem::replace(&mut *link, Link::Closed) {
                Link::Connecting(t) => t,
                other => {
                    *link = other;
                    return Err(ProtocolError::Custom("session already opened".into()));
                }
            };
            let open = Packet::Open(OpenPayload {
                sid: self.id.clone(),
                upgrades: self.config.upgrades.clone(),
                ping_interval: self.config.ping_interval.as_millis() as u64,
                ping_timeout: self.config.ping_timeout.as_millis() as u64,
                max_payload: self.config.max_payload as u64,
            });
            transport.send(vec![open])?;
            *link = Link::Open(transport);
        }

        info!(sid = %self.id, transport = %self.origin, "Session opened");
        self.metrics.session_opened();
        heartbeat::spawn(self);
        self.handler.on_open(self);
        Ok(())
    }

    /// Queue packets on the canonical transport, preserving order
    pub fn send(&self, packets: Vec<Packet>) -> Result<()> {
        let sizes: Vec<usize> = packets.iter().map(Packet::payload_len).collect();
        {
            let link = self.link.lock();
            match &*link {
                Link::Open(t) => t.send(packets)?,
                Link::Upgrading { old, .. } => old.send(packets)?,
                Link::Upgraded(s) => s.send(packets)?,
                Link::Connecting(_) | Link::Closing { .. } | Link::Closed => {
                    return Err(ProtocolError::ConnectionClosed)
                }
            }
        }
        for size in sizes {
            self.metrics.packet_sent(size as u64);
        }
        Ok(())
    }

    /// Serve one polling GET: wait for the next outbound batch.
    pub async fn pull(self: &Arc<Self>) -> Result<Vec<Packet>> {
        let handle = {
            let link = self.link.lock();
            match &*link {
                Link::Closed => return Err(ProtocolError::UnknownSession),
                other => other
                    .polling()
                    .map(PollingTransport::handle)
                    .ok_or(ProtocolError::TransportMismatch)?,
            }
        };

        let batch = handle.pull().await?;
        trace!(sid = %self.id, packets = batch.len(), "Polling batch delivered");

        if batch.contains(&Packet::Close) {
            let pending = match &*self.link.lock() {
                Link::Closing { reason, .. } => Some(*reason),
                _ => None,
            };
            if let Some(reason) = pending {
                self.finalize(reason);
            }
        }
        Ok(batch)
    }

    /// Serve one polling POST: decode the body and process every packet in it.
    ///
    /// A decode error closes the session and is returned to the caller.
    pub fn push(self: &Arc<Self>, body: &[u8]) -> Result<()> {
        let (handle, source) = {
            let link = self.link.lock();
            match &*link {
                Link::Closed => return Err(ProtocolError::UnknownSession),
                other => other
                    .polling()
                    .map(|p| (p.handle(), p.id()))
                    .ok_or(ProtocolError::TransportMismatch)?,
            }
        };
        let _guard = handle.begin_push()?;

        let packets = match payload::decode_batch(body, self.config.max_payload) {
            Ok(packets) => packets,
            Err(e @ ProtocolError::OversizedPacket(_)) => return Err(e),
            Err(e) => {
                warn!(sid = %self.id, error = %e, "Invalid polling body");
                self.metrics.decode_error();
                self.close(CloseReason::DecodeError);
                return Err(e);
            }
        };

        for packet in packets {
            self.on_packet(source, packet);
        }
        Ok(())
    }

    /// Read frames from a socket transport until it ends or the session closes
    pub(crate) async fn read_socket<R>(self: Arc<Self>, source: TransportId, mut reader: R)
    where
        R: Stream<Item = Result<Frame>> + Unpin,
    {
        loop {
            let next = tokio::select! {
                _ = self.cancel.cancelled() => break,
                next = reader.next() => next,
            };

            match next {
                Some(Ok(frame)) if frame.len() > self.config.max_payload => {
                    self.transport_failed(source, ProtocolError::OversizedPacket(frame.len()));
                    break;
                }
                Some(Ok(frame)) => match Packet::from_frame(frame) {
                    Ok(packet) => self.on_packet(source, packet),
                    Err(e) => {
                        self.transport_failed(source, e);
                        break;
                    }
                },
                Some(Err(e)) => {
                    self.transport_failed(source, e);
                    break;
                }
                None => {
                    self.transport_ended(source);
                    break;
                }
            }

            if self.route(source) == Route::Stale {
                break;
            }
        }
        trace!(sid = %self.id, transport_id = source, "Socket reader stopped");
    }

    fn route(&self, source: TransportId) -> Route {
        let link = self.link.lock();
        match &*link {
            Link::Upgrading { new, .. } if new.id() == source => Route::Probe,
            other if other.canonical_id() == Some(source) => Route::Canonical,
            _ => Route::Stale,
        }
    }

    fn on_packet(self: &Arc<Self>, source: TransportId, packet: Packet) {
        let route = self.route(source);
        if route == Route::Stale {
            trace!(sid = %self.id, transport_id = source, "Dropping packet from stale transport");
            return;
        }
        self.metrics.packet_received(packet.payload_len() as u64);
        if route == Route::Probe {
            return self.on_probe_packet(source, packet);
        }

        match packet {
            Packet::Pong(_) => {
                if !self.heartbeat.on_pong() {
                    trace!(sid = %self.id, "Ignoring unsolicited pong");
                }
            }
            Packet::Ping(data) => {
                if let Err(e) = self.send(vec![Packet::Pong(data)]) {
                    debug!(sid = %self.id, error = %e, "Failed to answer ping");
                }
            }
            Packet::Close => {
                debug!(sid = %self.id, "Client requested close");
                self.close(CloseReason::ClientClose);
            }
            Packet::Message(_) | Packet::Binary(_) => {
                if let Err(e) = self.handler.on_message(self, packet) {
                    if e.is_fatal() {
                        warn!(sid = %self.id, error = %e, "Closing session on invalid packet");
                        self.metrics.decode_error();
                        self.close(CloseReason::DecodeError);
                    } else {
                        debug!(sid = %self.id, error = %e, "Message handler failed");
                    }
                }
            }
            Packet::Open(_) => {
                warn!(sid = %self.id, "Client sent an open packet");
                self.metrics.decode_error();
                self.close(CloseReason::DecodeError);
            }
            Packet::Upgrade | Packet::Noop => {}
        }
    }

    fn transport_failed(self: &Arc<Self>, source: TransportId, error: ProtocolError) {
        match self.route(source) {
            Route::Canonical => {
                warn!(sid = %self.id, error = %error, "Transport error");
                let reason = if error.is_fatal() {
                    self.metrics.decode_error();
                    CloseReason::DecodeError
                } else {
                    CloseReason::TransportError
                };
                self.close(reason);
            }
            Route::Probe => self.abandon_upgrade(source, &error.to_string()),
            Route::Stale => {}
        }
    }

    fn transport_ended(self: &Arc<Self>, source: TransportId) {
        match self.route(source) {
            Route::Canonical => self.close(CloseReason::TransportClosed),
            Route::Probe => self.abandon_upgrade(source, "probe transport closed"),
            Route::Stale => {}
        }
    }

    /// Close the session.
    ///
    /// Server-initiated reasons send a `close` packet first. While polling
    /// carries the traffic and no pull is outstanding, that packet waits for
    /// the next pull (up to the ping timeout) before the transport is torn
    /// down; a half-done upgrade is abandoned. Closing twice is a no-op.
    pub fn close(self: &Arc<Self>, reason: CloseReason) {
        if reason.sends_close_packet() && self.announce_close(reason) {
            return;
        }
        self.finalize(reason);
    }

    /// Queue the `close` packet. Returns true when teardown is deferred to the
    /// next pull.
    fn announce_close(self: &Arc<Self>, reason: CloseReason) -> bool {
        let mut link = self.link.lock();
        let idle_poll = match &*link {
            Link::Open(Transport::Polling(p)) | Link::Upgrading { old: p, .. } => {
                !p.has_pending_poll()
            }
            _ => false,
        };

        if idle_poll {
            let polling = match std::mem::replace(&mut *link, Link::Closed) {
                Link::Open(Transport::Polling(p)) => p,
                Link::Upgrading { old, new, .. } => {
                    new.close();
                    self.metrics.upgrade_abandoned();
                    debug!(sid = %self.id, "Upgrade abandoned on close");
                    old
                }
                other => {
                    *link = other;
                    return false;
                }
            };
            if let Err(e) = polling.send(vec![Packet::Close]) {
                trace!(sid = %self.id, error = %e, "Close packet not queued");
            }
            *link = Link::Closing { polling, reason };
            drop(link);

            debug!(sid = %self.id, reason = %reason, "Close queued for next poll");
            self.spawn_closing_timer(reason);
            return true;
        }

        let sent = match &*link {
            Link::Open(t) => t.send(vec![Packet::Close]),
            Link::Upgrading { old, .. } => old.send(vec![Packet::Close]),
            Link::Upgraded(s) => s.send(vec![Packet::Close]),
            Link::Connecting(_) | Link::Closing { .. } | Link::Closed => return false,
        };
        if let Err(e) = sent {
            trace!(sid = %self.id, error = %e, "Close packet not delivered");
        }
        false
    }

    fn spawn_closing_timer(self: &Arc<Self>, reason: CloseReason) {
        let weak = Arc::downgrade(self);
        let grace = self.config.ping_timeout;
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(grace) => {
                    if let Some(session) = weak.upgrade() {
                        session.finalize(reason);
                    }
                }
            }
        });
    }

    /// Tear everything down: transports, timers, registry entry
    fn finalize(self: &Arc<Self>, reason: CloseReason) {
        let previous = {
            let mut link = self.link.lock();
            std::mem::replace(&mut *link, Link::Closed)
        };
        if matches!(previous, Link::Closed) {
            return;
        }
        if matches!(previous, Link::Upgrading { .. }) {
            self.metrics.upgrade_abandoned();
        }

        for transport in previous.into_transports() {
            transport.close();
        }
        self.cancel.cancel();
        self.registry.remove(&self.id);

        self.metrics.session_closed();
        if reason == CloseReason::PingTimeout {
            self.metrics.ping_timeout();
        }
        info!(sid = %self.id, reason = %reason, "Session closed");

        self.handler.on_close(self, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codec::FrameCodec;
    use parking_lot::Mutex as PlMutex;
    use tokio_util::codec::Framed;

    #[derive(Default)]
    struct Recorder {
        messages: PlMutex<Vec<Packet>>,
        closed: PlMutex<Option<CloseReason>>,
    }

    impl SessionHandler for Recorder {
        fn on_message(&self, session: &Arc<Session>, packet: Packet) -> Result<()> {
            if let Packet::Message(text) = &packet {
                if text == "bad" {
                    return Err(ProtocolError::Decode("bad".into()));
                }
                session.send(vec![Packet::Message(format!("echo:{text}"))])?;
            }
            self.messages.lock().push(packet);
            Ok(())
        }

        fn on_close(&self, _session: &Arc<Session>, reason: CloseReason) {
            *self.closed.lock() = Some(reason);
        }
    }

    fn config() -> SessionConfig {
        SessionConfig {
            ping_interval: Duration::from_millis(300),
            ping_timeout: Duration::from_millis(200),
            max_payload: 1_000,
            upgrades: vec!["websocket".into()],
        }
    }

    fn polling_session(registry: &SessionRegistry) -> (Arc<Session>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let handler = recorder.clone();
        let session = Session::new(
            "sid-1".into(),
            Transport::Polling(PollingTransport::new()),
            config(),
            registry,
            Arc::new(Metrics::new()),
            move |_| handler,
        );
        registry.insert(session.clone()).unwrap();
        session.open().unwrap();
        (session, recorder)
    }

    #[tokio::test]
    async fn open_packet_is_first_pull() {
        let registry = SessionRegistry::new(10);
        let (session, _) = polling_session(&registry);

        let batch = session.pull().await.unwrap();
        match &batch[..] {
            [Packet::Open(open)] => {
                assert_eq!(open.sid, "sid-1");
                assert_eq!(open.upgrades, vec!["websocket".to_string()]);
                assert_eq!(open.ping_interval, 300);
            }
            other => panic!("unexpected batch {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Open);
    }

    #[tokio::test]
    async fn push_routes_messages_and_replies_through_poll() {
        let registry = SessionRegistry::new(10);
        let (session, recorder) = polling_session(&registry);
        session.pull().await.unwrap();

        session.push(b"4hello").unwrap();
        assert_eq!(recorder.messages.lock().len(), 1);
        assert_eq!(
            session.pull().await.unwrap(),
            vec![Packet::Message("echo:hello".into())]
        );
    }

    #[tokio::test]
    async fn client_close_removes_session() {
        let registry = SessionRegistry::new(10);
        let (session, recorder) = polling_session(&registry);

        session.push(b"1").unwrap();
        assert!(session.is_closed());
        assert!(registry.get("sid-1").is_none());
        assert_eq!(*recorder.closed.lock(), Some(CloseReason::ClientClose));
        assert!(matches!(
            session.pull().await,
            Err(ProtocolError::UnknownSession)
        ));
    }

    #[tokio::test]
    async fn fatal_handler_error_closes_session() {
        let registry = SessionRegistry::new(10);
        let (session, recorder) = polling_session(&registry);

        session.push(b"4bad").unwrap();
        assert!(session.is_closed());
        assert_eq!(*recorder.closed.lock(), Some(CloseReason::DecodeError));
    }

    #[tokio::test]
    async fn packets_from_stale_transport_are_not_counted() {
        let registry = SessionRegistry::new(10);
        let (session, recorder) = polling_session(&registry);
        session.pull().await.unwrap();

        let stale = PollingTransport::new().id();
        session.on_packet(stale, Packet::Message("ignored".into()));
        assert_eq!(session.metrics.snapshot().packets_received, 0);
        assert!(recorder.messages.lock().is_empty());

        session.push(b"4hello").unwrap();
        assert_eq!(session.metrics.snapshot().packets_received, 1);
    }

    #[tokio::test]
    async fn malformed_body_closes_session() {
        let registry = SessionRegistry::new(10);
        let (session, _) = polling_session(&registry);

        assert!(session.push(b"9").is_err());
        assert!(session.is_closed());
    }

    #[tokio::test]
    async fn server_close_on_idle_poll_waits_for_next_pull() {
        let registry = SessionRegistry::new(10);
        let (session, recorder) = polling_session(&registry);
        session.pull().await.unwrap();

        session.close(CloseReason::ServerClose);
        assert_eq!(session.state(), SessionState::Closing);

        assert_eq!(session.pull().await.unwrap(), vec![Packet::Close]);
        assert!(session.is_closed());
        assert_eq!(*recorder.closed.lock(), Some(CloseReason::ServerClose));
    }

    #[tokio::test]
    async fn socket_session_replies_on_same_connection() {
        let registry = SessionRegistry::new(10);
        let (server_io, client_io) = tokio::io::duplex(4096);
        let (transport, reader) =
            SocketTransport::spawn(Framed::new(server_io, FrameCodec::default()));
        let source = transport.id();
        let recorder = Arc::new(Recorder::default());
        let handler = recorder.clone();
        let session = Session::new(
            "sid-2".into(),
            Transport::Socket(transport),
            SessionConfig {
                upgrades: Vec::new(),
                ..config()
            },
            &registry,
            Arc::new(Metrics::new()),
            move |_| handler,
        );
        registry.insert(session.clone()).unwrap();
        session.open().unwrap();
        tokio::spawn(session.clone().read_socket(source, reader));

        let mut client = Framed::new(client_io, FrameCodec::default());
        let open = client.next().await.unwrap().unwrap();
        assert!(matches!(open, Frame::Text(ref t) if t.starts_with("0{")));

        use futures::SinkExt;
        client.send(Frame::Text("4hi".into())).await.unwrap();
        assert_eq!(
            client.next().await.unwrap().unwrap(),
            Frame::Text("4echo:hi".into())
        );

        client.send(Frame::Text("1".into())).await.unwrap();
        assert!(client.next().await.is_none());
        assert!(session.is_closed());
    }
}
