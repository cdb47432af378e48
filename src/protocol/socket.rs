//! # Logical Socket
//!
//! One connection to one namespace, scoped within a session. Created when a
//! namespace `connect` is accepted and removed on `disconnect` or session
//! close. Its id is namespace-scoped and distinct from the session id.

use crate::error::{ProtocolError, Result};
use crate::protocol::ack::AckRegistry;
use crate::protocol::client::Client;
use crate::protocol::data::Data;
use crate::protocol::message::Message;
use crate::protocol::namespace::{DisconnectReason, Namespace};
use crate::session::Session;
use bytes::Bytes;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// A client's connection to one namespace
pub struct Socket {
    id: String,
    namespace: Arc<Namespace>,
    session: Weak<Session>,
    session_id: String,
    client: Weak<Client>,
    auth: Value,
    connected: AtomicBool,
    acks: AckRegistry,
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.id)
            .field("namespace", &self.namespace.path())
            .field("session_id", &self.session_id)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Socket {
    pub(crate) fn new(
        id: String,
        namespace: Arc<Namespace>,
        session: &Arc<Session>,
        client: Weak<Client>,
        auth: Value,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            id,
            namespace,
            session: Arc::downgrade(session),
            session_id: session.id().to_string(),
            client,
            auth,
            connected: AtomicBool::new(true),
            acks: AckRegistry::new(ack_timeout),
        }
    }

    /// Namespace-scoped socket id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Path of the namespace this socket belongs to
    pub fn namespace(&self) -> &str {
        self.namespace.path()
    }

    /// Id of the underlying transport session
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Auth payload sent with the namespace connect (`{}` when absent)
    pub fn auth(&self) -> &Value {
        &self.auth
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Emit `event` with `args` to the client
    pub fn emit(&self, event: &str, args: Vec<Data>) -> Result<()> {
        self.ensure_connected()?;
        let (message, attachments) = Message::event(self.namespace(), event, args, None);
        self.send_message(message, attachments)
    }

    /// Emit `event` and wait for the client's acknowledgement.
    ///
    /// The receiver yields the ack arguments, or an error if the ack expires
    /// or the socket disconnects first.
    pub fn emit_with_ack(&self, event: &str, args: Vec<Data>) -> Result<oneshot::Receiver<Vec<Data>>> {
        self.ensure_connected()?;
        let (id, rx) = self.acks.register();
        let (message, attachments) = Message::event(self.namespace(), event, args, Some(id));
        self.send_message(message, attachments)?;
        Ok(rx)
    }

    /// Disconnect this socket from its namespace. The session stays open.
    pub fn disconnect(self: &Arc<Self>) -> Result<()> {
        if !self.mark_disconnected() {
            return Ok(());
        }
        let sent = self.send_message(Message::disconnect(self.namespace()), Vec::new());
        if let Some(client) = self.client.upgrade() {
            client.detach(self.namespace());
        }
        self.namespace.remove_socket(&self.id);
        self.namespace
            .run_disconnect_hooks(self, DisconnectReason::ServerNamespaceDisconnect);
        debug!(sid = %self.session_id, nsp = %self.namespace(), "Socket disconnected by server");
        sent
    }

    pub(crate) fn send_message(&self, message: Message, attachments: Vec<Bytes>) -> Result<()> {
        let session = self.session.upgrade().ok_or(ProtocolError::ConnectionClosed)?;
        session.send(message.into_packets(attachments))
    }

    pub(crate) fn namespace_handle(&self) -> &Arc<Namespace> {
        &self.namespace
    }

    pub(crate) fn acks(&self) -> &AckRegistry {
        &self.acks
    }

    /// Returns true if the socket was connected
    pub(crate) fn mark_disconnected(&self) -> bool {
        let was = self.connected.swap(false, Ordering::AcqRel);
        if was {
            self.acks.clear();
        }
        was
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProtocolError::ConnectionClosed)
        }
    }
}
