//! # Namespaces
//!
//! A namespace is a statically configured routing domain. Each one has its own
//! event handlers, connection hooks and set of connected logical sockets. The
//! set of namespaces is fixed when the server is built: connecting to an
//! unknown path is answered with `connect_error`, never auto-created.

use crate::config::MAIN_NAMESPACE;
use crate::protocol::data::Data;
use crate::protocol::dispatcher::{AckSender, Dispatcher};
use crate::protocol::socket::Socket;
use crate::session::CloseReason;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, trace};

type ConnectHook = dyn Fn(&Arc<Socket>) + Send + Sync + 'static;
type DisconnectHook = dyn Fn(&Arc<Socket>, DisconnectReason) + Send + Sync + 'static;

/// Why a logical socket left its namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The client sent `disconnect` for this namespace
    ClientNamespaceDisconnect,
    /// [`Socket::disconnect`] was called
    ServerNamespaceDisconnect,
    /// The whole session ended
    SessionClosed(CloseReason),
}

/// One configured namespace
pub struct Namespace {
    path: String,
    dispatcher: Dispatcher,
    sockets: DashMap<String, Arc<Socket>>,
    connect_hooks: RwLock<Vec<Arc<ConnectHook>>>,
    disconnect_hooks: RwLock<Vec<Arc<DisconnectHook>>>,
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("path", &self.path)
            .field("sockets", &self.sockets.len())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Namespace {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            dispatcher: Dispatcher::new(),
            sockets: DashMap::new(),
            connect_hooks: RwLock::new(Vec::new()),
            disconnect_hooks: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Register the handler for `event`.
    ///
    /// The ack sender is `Some` only when the client asked for an ack.
    pub fn on<E, F>(&self, event: E, handler: F)
    where
        E: Into<Cow<'static, str>>,
        F: Fn(&Arc<Socket>, Vec<Data>, Option<AckSender>) + Send + Sync + 'static,
    {
        self.dispatcher.register(event, handler);
    }

    /// Run `hook` for every accepted connection, after the connect reply and
    /// the `auth` event have been sent.
    pub fn on_connection<F>(&self, hook: F)
    where
        F: Fn(&Arc<Socket>) + Send + Sync + 'static,
    {
        self.connect_hooks.write().push(Arc::new(hook));
    }

    pub fn on_disconnect<F>(&self, hook: F)
    where
        F: Fn(&Arc<Socket>, DisconnectReason) + Send + Sync + 'static,
    {
        self.disconnect_hooks.write().push(Arc::new(hook));
    }

    /// Connected sockets of this namespace
    pub fn sockets(&self) -> Vec<Arc<Socket>> {
        self.sockets.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn socket(&self, id: &str) -> Option<Arc<Socket>> {
        self.sockets.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn socket_count(&self) -> usize {
        self.sockets.len()
    }

    /// Emit `event` to every connected socket. Returns how many were reached.
    pub fn emit(&self, event: &str, args: Vec<Data>) -> usize {
        self.sockets()
            .iter()
            .filter(|socket| match socket.emit(event, args.clone()) {
                Ok(()) => true,
                Err(e) => {
                    trace!(nsp = %self.path, socket_id = %socket.id(), error = %e, "Broadcast skipped socket");
                    false
                }
            })
            .count()
    }

    pub(crate) fn dispatch(
        &self,
        socket: &Arc<Socket>,
        event: &str,
        args: Vec<Data>,
        ack: Option<AckSender>,
    ) {
        if !self.dispatcher.dispatch(socket, event, args, ack) {
            debug!(nsp = %self.path, event, "No handler registered for event");
        }
    }

    pub(crate) fn add_socket(&self, socket: Arc<Socket>) {
        self.sockets.insert(socket.id().to_string(), socket);
    }

    pub(crate) fn remove_socket(&self, id: &str) {
        self.sockets.remove(id);
    }

    pub(crate) fn run_connect_hooks(&self, socket: &Arc<Socket>) {
        let hooks = self.connect_hooks.read().clone();
        for hook in hooks {
            hook(socket);
        }
    }

    pub(crate) fn run_disconnect_hooks(&self, socket: &Arc<Socket>, reason: DisconnectReason) {
        let hooks = self.disconnect_hooks.read().clone();
        for hook in hooks {
            hook(socket, reason);
        }
    }
}

/// The fixed set of namespaces of one server
#[derive(Debug)]
pub struct NamespaceManager {
    namespaces: IndexMap<String, Arc<Namespace>>,
}

impl NamespaceManager {
    /// Build the set: the main namespace plus every path in `extra`
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut namespaces = IndexMap::new();
        namespaces.insert(
            MAIN_NAMESPACE.to_string(),
            Arc::new(Namespace::new(MAIN_NAMESPACE)),
        );
        for path in extra {
            let path = path.into();
            namespaces
                .entry(path.clone())
                .or_insert_with(|| Arc::new(Namespace::new(path)));
        }
        Self { namespaces }
    }

    pub fn get(&self, path: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(path).cloned()
    }

    pub fn main(&self) -> Arc<Namespace> {
        self.namespaces
            .get(MAIN_NAMESPACE)
            .cloned()
            .unwrap_or_else(|| Arc::new(Namespace::new(MAIN_NAMESPACE)))
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.namespaces.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Namespace>> {
        self.namespaces.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn main_namespace_always_exists() {
        let manager = NamespaceManager::new(Vec::<String>::new());
        assert!(manager.get("/").is_some());
        assert_eq!(manager.main().path(), "/");
        assert!(manager.get("/random").is_none());
    }

    #[test]
    fn configured_paths_are_kept_in_order() {
        let manager = NamespaceManager::new(["/custom", "/admin", "/custom"]);
        let paths: Vec<&str> = manager.paths().collect();
        assert_eq!(paths, ["/", "/custom", "/admin"]);
    }

    #[test]
    fn handlers_are_registered_per_namespace() {
        let manager = NamespaceManager::new(["/custom"]);
        manager.main().on("message", |_, _, _| {});
        assert!(manager.main().dispatcher.has_handler("message"));
        assert!(!manager
            .get("/custom")
            .map(|n| n.dispatcher.has_handler("message"))
            .unwrap_or(true));
    }
}
