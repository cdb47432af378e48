//! # Client
//!
//! The multiplexing side of one session. Decodes application packets out of
//! transport `message` packets, reassembles binary attachments, and routes
//! the result to namespaces, logical sockets and pending acks.
//!
//! Any decode error is returned as fatal so the session closes without a reply.

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::binary::{AttachmentBuffer, Inbound};
use crate::protocol::data::{self, Data};
use crate::protocol::dispatcher::AckSender;
use crate::protocol::message::{Message, MessageKind};
use crate::protocol::namespace::{DisconnectReason, NamespaceManager};
use crate::protocol::socket::Socket;
use crate::session::{CloseReason, Session, SessionHandler};
use crate::utils::id::generate_id;
use crate::utils::metrics::Metrics;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Reply text for a connect to an unconfigured namespace
pub const INVALID_NAMESPACE: &str = "Invalid namespace";

/// Event carrying the connect auth payload back to the client
pub const AUTH_EVENT: &str = "auth";

/// Timing for the multiplex layer of one session
#[derive(Debug, Clone, Copy)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    pub ack_timeout: Duration,
    pub max_attachments: usize,
}

/// Per-session multiplexer
pub struct Client {
    session: Weak<Session>,
    me: Weak<Client>,
    namespaces: Arc<NamespaceManager>,
    sockets: Mutex<HashMap<String, Arc<Socket>>>,
    attachments: Mutex<AttachmentBuffer>,
    has_connected: AtomicBool,
    config: ClientConfig,
    metrics: Arc<Metrics>,
}

impl Client {
    pub fn new(
        session: Weak<Session>,
        namespaces: Arc<NamespaceManager>,
        config: ClientConfig,
        metrics: Arc<Metrics>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Client {
            session,
            me: me.clone(),
            namespaces,
            sockets: Mutex::new(HashMap::new()),
            attachments: Mutex::new(AttachmentBuffer::with_limit(config.max_attachments)),
            has_connected: AtomicBool::new(false),
            config,
            metrics,
        })
    }

    /// The session this client multiplexes, while it is alive
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.upgrade()
    }

    /// Logical socket connected to `namespace`, if any
    pub fn socket(&self, namespace: &str) -> Option<Arc<Socket>> {
        self.sockets.lock().get(namespace).cloned()
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.lock().len()
    }

    /// Forget the socket of `namespace` without notifying anyone
    pub(crate) fn detach(&self, namespace: &str) -> Option<Arc<Socket>> {
        self.sockets.lock().remove(namespace)
    }

    fn send(&self, session: &Arc<Session>, message: Message) -> Result<()> {
        session.send(message.into_packets(Vec::new()))
    }

    fn handle_text(&self, session: &Arc<Session>, text: &str) -> Result<()> {
        let message = Message::decode(text)?;
        trace!(sid = %session.id(), kind = ?message.kind, nsp = %message.namespace, "Application packet");

        let ready = self.attachments.lock().accept(message)?;
        match ready {
            Some(inbound) => self.route(session, inbound),
            None => Ok(()),
        }
    }

    fn handle_binary(&self, session: &Arc<Session>, bytes: bytes::Bytes) -> Result<()> {
        let ready = self.attachments.lock().push(bytes)?;
        match ready {
            Some(inbound) => self.route(session, inbound),
            None => Ok(()),
        }
    }

    fn route(&self, session: &Arc<Session>, inbound: Inbound) -> Result<()> {
        match inbound.kind {
            MessageKind::Connect => {
                let auth = match &inbound.data {
                    Some(value) => data::deconstruct(value.clone()).0,
                    None => Value::Object(Default::default()),
                };
                self.connect(session, &inbound.namespace, auth)
            }
            MessageKind::Disconnect => {
                self.disconnect(&inbound.namespace);
                Ok(())
            }
            MessageKind::Event | MessageKind::BinaryEvent => self.event(inbound),
            MessageKind::Ack | MessageKind::BinaryAck => {
                self.ack(inbound);
                Ok(())
            }
            MessageKind::ConnectError => {
                Err(ProtocolError::Decode(constants::ERR_UNEXPECTED_PACKET.into()))
            }
        }
    }

    fn connect(&self, session: &Arc<Session>, path: &str, auth: Value) -> Result<()> {
        let Some(namespace) = self.namespaces.get(path) else {
            debug!(sid = %session.id(), nsp = path, "Connect to unknown namespace");
            return self.send(session, Message::connect_error(path, INVALID_NAMESPACE));
        };

        if self.sockets.lock().contains_key(path) {
            debug!(sid = %session.id(), nsp = path, "Duplicate namespace connect ignored");
            return Ok(());
        }

        let socket = Arc::new(Socket::new(
            generate_id(),
            Arc::clone(&namespace),
            session,
            self.me.clone(),
            auth.clone(),
            self.config.ack_timeout,
        ));
        self.sockets
            .lock()
            .insert(path.to_string(), Arc::clone(&socket));
        namespace.add_socket(Arc::clone(&socket));
        self.has_connected.store(true, Ordering::Release);
        self.metrics.namespace_connected();

        self.send(session, Message::connect(path, socket.id()))?;
        socket.emit(AUTH_EVENT, vec![Data::from(auth)])?;
        debug!(sid = %session.id(), nsp = path, socket_id = %socket.id(), "Namespace connected");

        namespace.run_connect_hooks(&socket);
        Ok(())
    }

    fn disconnect(&self, path: &str) {
        let Some(socket) = self.detach(path) else {
            trace!(nsp = path, "Disconnect for unconnected namespace");
            return;
        };
        if socket.mark_disconnected() {
            let namespace = socket.namespace_handle();
            namespace.remove_socket(socket.id());
            namespace.run_disconnect_hooks(&socket, DisconnectReason::ClientNamespaceDisconnect);
        }
    }

    fn event(&self, inbound: Inbound) -> Result<()> {
        let Some(socket) = self.socket(&inbound.namespace) else {
            trace!(nsp = %inbound.namespace, "Event for unconnected namespace dropped");
            return Ok(());
        };
        let id = inbound.id;
        let mut items = inbound.into_items().into_iter();
        let event = match items.next() {
            Some(Data::String(name)) => name,
            _ => return Err(ProtocolError::Decode(constants::ERR_INVALID_PAYLOAD.into())),
        };
        let args: Vec<Data> = items.collect();
        let ack = id.map(|id| AckSender::new(Arc::clone(&socket), id));

        let namespace = Arc::clone(socket.namespace_handle());
        namespace.dispatch(&socket, &event, args, ack);
        Ok(())
    }

    fn ack(&self, inbound: Inbound) {
        let Some(socket) = self.socket(&inbound.namespace) else {
            return;
        };
        if let Some(id) = inbound.id {
            socket.acks().resolve(id, inbound.into_items());
        }
    }

    fn spawn_connect_timeout(&self, session: &Arc<Session>) {
        let weak_session = Arc::downgrade(session);
        let me = self.me.clone();
        let closed = session.closed();
        let timeout = self.config.connect_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = closed.cancelled() => {}
                _ = tokio::time::sleep(timeout) => {
                    let connected = me
                        .upgrade()
                        .map(|c| c.has_connected.load(Ordering::Acquire))
                        .unwrap_or(true);
                    if !connected {
                        if let Some(session) = weak_session.upgrade() {
                            debug!(sid = %session.id(), "No namespace connect before timeout");
                            session.close(CloseReason::ConnectTimeout);
                        }
                    }
                }
            }
        });
    }
}

impl SessionHandler for Client {
    fn on_open(&self, session: &Arc<Session>) {
        self.spawn_connect_timeout(session);
    }

    fn on_message(&self, session: &Arc<Session>, packet: Packet) -> Result<()> {
        match packet {
            Packet::Message(text) => self.handle_text(session, &text),
            Packet::Binary(bytes) => self.handle_binary(session, bytes),
            other => {
                warn!(sid = %session.id(), packet = ?other.packet_type(), "Non-message packet routed to client");
                Ok(())
            }
        }
    }

    fn on_tick(&self, _session: &Arc<Session>) {
        let sockets: Vec<Arc<Socket>> = self.sockets.lock().values().cloned().collect();
        for socket in sockets {
            socket.acks().sweep();
        }
    }

    fn on_close(&self, _session: &Arc<Session>, reason: CloseReason) {
        self.attachments.lock().clear();
        let sockets: Vec<Arc<Socket>> = self.sockets.lock().drain().map(|(_, s)| s).collect();
        for socket in sockets {
            if socket.mark_disconnected() {
                let namespace = socket.namespace_handle();
                namespace.remove_socket(socket.id());
                namespace.run_disconnect_hooks(&socket, DisconnectReason::SessionClosed(reason));
            }
        }
    }
}
