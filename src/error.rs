//! # Error Types
//!
//! Comprehensive error handling for the realtime engine.
//!
//! This module defines every error variant the engine can surface, from low-level
//! I/O failures up to protocol violations on either layer.
//!
//! ## Error Categories
//! - **Request rejections**: malformed handshake parameters, unknown or stale `sid`,
//!   overlapping polls. Reported to the caller, the session is left untouched.
//! - **Decode errors**: unknown packet types, malformed JSON, bad ack ids. Fatal to
//!   the whole session.
//! - **Namespace errors**: connect to an unconfigured namespace. Recoverable.
//! - **Liveness errors**: ping timeout. Fatal to the session.
//! - **Upgrade violations**: rejected upgrade attempts. The original session survives.
//!
//! All errors implement `std::error::Error` for interoperability.
//!
//! ## Example Usage
//! ```rust
//! use realtime_protocol::error::{ProtocolError, Result};
//! use tracing::{error, info};
//!
//! fn parse_version(raw: &str) -> Result<u8> {
//!     raw.parse::<u8>()
//!         .map_err(|_| ProtocolError::InvalidRequest(format!("bad EIO value: {raw}")))
//! }
//!
//! match parse_version("abc") {
//!     Ok(v) => info!(v, "parsed"),
//!     Err(e) => error!(error = %e, status = e.status_code(), "rejected"),
//! }
//! ```

use std::io;
use thiserror::Error;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Handshake / request rejection messages
    pub const ERR_MISSING_VERSION: &str = "Missing EIO query parameter";
    pub const ERR_UNSUPPORTED_VERSION: &str = "Unsupported protocol version";
    pub const ERR_MISSING_TRANSPORT: &str = "Missing transport query parameter";
    pub const ERR_UNKNOWN_TRANSPORT: &str = "Unknown transport";
    pub const ERR_TRANSPORT_DISABLED: &str = "Transport disabled by configuration";
    pub const ERR_BAD_METHOD: &str = "Unsupported request method";
    pub const ERR_HANDSHAKE_METHOD: &str = "Handshake must use GET";
    pub const ERR_TOO_MANY_SESSIONS: &str = "Session limit reached";
    pub const ERR_WRONG_ENDPOINT: &str = "Transport not served by this endpoint";

    /// Decode errors
    pub const ERR_EMPTY_PACKET: &str = "Empty packet";
    pub const ERR_INVALID_OPEN: &str = "Invalid open payload";
    pub const ERR_INVALID_PAYLOAD: &str = "Invalid payload format";
    pub const ERR_INVALID_ATTACHMENTS: &str = "Invalid attachment count";
    pub const ERR_INVALID_BASE64: &str = "Invalid base64 binary packet";
    pub const ERR_INVALID_PLACEHOLDER: &str = "Placeholder index out of range";
    pub const ERR_UNEXPECTED_BINARY: &str = "Binary frame without pending placeholder packet";
    pub const ERR_TOO_MANY_ATTACHMENTS: &str = "Attachment count exceeds limit";
    pub const ERR_NESTED_ATTACHMENTS: &str = "Binary packet received while attachments pending";
    pub const ERR_UNEXPECTED_PACKET: &str = "Unexpected packet from client";

    /// Upgrade errors
    pub const ERR_ALREADY_UPGRADING: &str = "Session is already upgrading";
    pub const ERR_ALREADY_UPGRADED: &str = "Session already upgraded";
    pub const ERR_UPGRADE_NOT_ALLOWED: &str = "Session cannot be upgraded";
    pub const ERR_UPGRADE_WITHOUT_PROBE: &str = "Upgrade packet received before probe";
    pub const ERR_UPGRADE_TIMEOUT: &str = "Upgrade probe not completed in time";

    /// Connection errors
    pub const ERR_CONNECTION_CLOSED: &str = "Connection closed";
    pub const ERR_SESSION_CLOSED: &str = "Session closed";
}

/// ProtocolError is the primary error type for all engine operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown session id")]
    UnknownSession,

    #[error("Overlapping request for the same session")]
    ConcurrentPoll,

    #[error("Transport mismatch for session")]
    TransportMismatch,

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid packet type: {0:?}")]
    InvalidPacketType(char),

    #[error("Invalid ack id")]
    InvalidAckId,

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Ping timeout")]
    PingTimeout,

    #[error("Upgrade error: {0}")]
    Upgrade(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// True for errors reported to the caller without touching the session
    pub fn is_request_rejection(&self) -> bool {
        matches!(
            self,
            ProtocolError::InvalidRequest(_)
                | ProtocolError::UnknownSession
                | ProtocolError::ConcurrentPoll
                | ProtocolError::TransportMismatch
                | ProtocolError::Upgrade(_)
                | ProtocolError::OversizedPacket(_)
        )
    }

    /// True for errors that terminate the whole session
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Decode(_)
                | ProtocolError::InvalidPacketType(_)
                | ProtocolError::InvalidAckId
                | ProtocolError::Json(_)
                | ProtocolError::PingTimeout
        )
    }

    /// HTTP status equivalent when surfaced through the polling endpoint
    pub fn status_code(&self) -> u16 {
        match self {
            ProtocolError::OversizedPacket(_) => 413,
            e if e.is_request_rejection() => 400,
            ProtocolError::ConnectionClosed => 400,
            _ => 500,
        }
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
