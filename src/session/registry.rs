//! # Session Registry
//!
//! Concurrent map from session id to [`Session`]. The registry is the sole
//! owner of live sessions: it inserts on handshake and removes on close.
//!
//! Each [`Server`](crate::service::Server) owns its own registry, so several
//! engines can run side by side in one process (and in one test binary).
//!
//! ## Usage
//! ```ignore
//! let registry = SessionRegistry::new(10_000);
//! registry.insert(session.clone())?;
//! if let Some(session) = registry.get(sid) {
//!     session.push(body)?;
//! }
//! ```

use crate::error::{constants, ProtocolError, Result};
use crate::session::Session;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use tracing::trace;

type SessionMap = DashMap<String, Arc<Session>>;

/// Live sessions, keyed by id
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<SessionMap>,
    max_sessions: usize,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("max_sessions", &self.max_sessions)
            .finish()
    }
}

impl SessionRegistry {
    /// Create a registry admitting at most `max_sessions` live sessions
    pub fn new(max_sessions: usize) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            max_sessions,
        }
    }

    /// Register a new session.
    ///
    /// Fails when the registry is full or the id is already taken.
    pub fn insert(&self, session: Arc<Session>) -> Result<()> {
        if self.sessions.len() >= self.max_sessions {
            return Err(ProtocolError::InvalidRequest(
                constants::ERR_TOO_MANY_SESSIONS.into(),
            ));
        }
        match self.sessions.entry(session.id().to_string()) {
            Entry::Occupied(_) => Err(ProtocolError::Custom(format!(
                "duplicate session id {}",
                session.id()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(session);
                trace!(session_count = self.sessions.len(), "Session registered");
                Ok(())
            }
        }
    }

    pub fn get(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.get(sid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.remove(sid).map(|(_, session)| session)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every live session
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.sessions))
    }
}

/// Back-reference from a session to its registry
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<SessionMap>);

impl WeakRegistry {
    pub(crate) fn remove(&self, sid: &str) {
        if let Some(sessions) = self.0.upgrade() {
            sessions.remove(sid);
        }
    }
}
