use crate::error::{ProtocolError, Result};
use crate::protocol::data::Data;
use crate::protocol::message::Message;
use crate::protocol::socket::Socket;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;

type HandlerFn = dyn Fn(&Arc<Socket>, Vec<Data>, Option<AckSender>) + Send + Sync + 'static;

/// Event dispatcher of one namespace.
/// Handlers are keyed by event name; `Cow<'static, str>` keeps statically
/// known names allocation-free.
pub struct Dispatcher {
    handlers: RwLock<HashMap<Cow<'static, str>, Arc<HandlerFn>>>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let handlers = self.handlers.read();
        f.debug_struct("Dispatcher")
            .field("events", &handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Register `handler` for `event`, replacing any previous one
    pub fn register<E, F>(&self, event: E, handler: F)
    where
        E: Into<Cow<'static, str>>,
        F: Fn(&Arc<Socket>, Vec<Data>, Option<AckSender>) + Send + Sync + 'static,
    {
        self.handlers.write().insert(event.into(), Arc::new(handler));
    }

    pub fn has_handler(&self, event: &str) -> bool {
        self.handlers.read().contains_key(event)
    }

    /// Invoke the handler for `event`. Returns false when none is registered.
    ///
    /// The handler runs outside the table lock, so it may register handlers.
    pub fn dispatch(
        &self,
        socket: &Arc<Socket>,
        event: &str,
        args: Vec<Data>,
        ack: Option<AckSender>,
    ) -> bool {
        let handler = self.handlers.read().get(event).cloned();
        match handler {
            Some(handler) => {
                handler(socket, args, ack);
                true
            }
            None => false,
        }
    }
}

/// Completes one client-requested acknowledgement.
///
/// Handed to an event handler only when the incoming event carried an ack id.
/// Consuming `send` guarantees a single response.
#[derive(Debug)]
pub struct AckSender {
    socket: Arc<Socket>,
    id: u64,
}

impl AckSender {
    pub(crate) fn new(socket: Arc<Socket>, id: u64) -> Self {
        Self { socket, id }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Emit the `ack` carrying `args`. Binary arguments become attachments.
    pub fn send(self, args: Vec<Data>) -> Result<()> {
        if !self.socket.is_connected() {
            return Err(ProtocolError::ConnectionClosed);
        }
        let (message, attachments) = Message::ack(self.socket.namespace(), self.id, args);
        self.socket.send_message(message, attachments)
    }
}
