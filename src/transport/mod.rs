//! # Transport Layer
//!
//! Physical channels carrying transport packets for one session.
//!
//! Two variants exist:
//! - **Polling**: request/response HTTP long-polling. Outbound packets queue
//!   until the client pulls them; inbound packets arrive in POST bodies.
//! - **Socket**: a persistent duplex connection where every frame is one packet.
//!
//! A transport instance is owned by exactly one session and never shared
//! between sessions.

pub mod polling;
pub mod socket;
pub mod websocket;

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use std::sync::atomic::{AtomicU64, Ordering};

pub use polling::PollingTransport;
pub use socket::SocketTransport;
pub use websocket::WebSocketFrames;

/// Identifies one transport instance across its lifetime
pub type TransportId = u64;

static NEXT_TRANSPORT_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_transport_id() -> TransportId {
    NEXT_TRANSPORT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Transport names accepted in the `transport` query parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Polling,
    Websocket,
}

impl TransportKind {
    pub fn name(self) -> &'static str {
        match self {
            TransportKind::Polling => "polling",
            TransportKind::Websocket => "websocket",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "polling" => Ok(TransportKind::Polling),
            "websocket" => Ok(TransportKind::Websocket),
            _ => Err(ProtocolError::InvalidRequest(
                constants::ERR_UNKNOWN_TRANSPORT.into(),
            )),
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The active transport of a session
#[derive(Debug)]
pub enum Transport {
    Polling(PollingTransport),
    Socket(SocketTransport),
}

impl Transport {
    pub fn id(&self) -> TransportId {
        match self {
            Transport::Polling(t) => t.id(),
            Transport::Socket(t) => t.id(),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            Transport::Polling(_) => TransportKind::Polling,
            Transport::Socket(_) => TransportKind::Websocket,
        }
    }

    /// Queue packets for delivery, preserving order
    pub fn send(&self, packets: Vec<Packet>) -> Result<()> {
        match self {
            Transport::Polling(t) => t.send(packets),
            Transport::Socket(t) => t.send(packets),
        }
    }

    /// Tear the transport down. Pending polls are released with `noop`.
    pub fn close(&self) {
        match self {
            Transport::Polling(t) => t.close(),
            Transport::Socket(t) => t.close(),
        }
    }

    pub fn as_polling(&self) -> Option<&PollingTransport> {
        match self {
            Transport::Polling(t) => Some(t),
            Transport::Socket(_) => None,
        }
    }
}
