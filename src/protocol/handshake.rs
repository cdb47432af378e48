//! Handshake request validation.
//!
//! Every request reaching the engine, polling or socket, carries query
//! parameters:
//!
//! | parameter   | meaning                                             |
//! |-------------|-----------------------------------------------------|
//! | `EIO`       | protocol version, must be `4`                       |
//! | `transport` | `polling` or `websocket`                            |
//! | `sid`       | present on every request after the handshake        |
//!
//! Missing or unrecognized values reject the request before any session is
//! touched.

use crate::config::{EngineConfig, PROTOCOL_VERSION};
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::client::ClientConfig;
use crate::session::SessionConfig;
use crate::transport::TransportKind;
use tracing::{debug, instrument};

/// Validated query parameters of one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeQuery {
    pub transport: TransportKind,
    pub sid: Option<String>,
}

/// Parse and validate a raw query string (without the leading `?`)
#[instrument(level = "trace")]
pub fn parse_query(query: &str) -> Result<HandshakeQuery> {
    let mut version = None;
    let mut transport = None;
    let mut sid = None;

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "EIO" => version = Some(value.into_owned()),
            "transport" => transport = Some(value.into_owned()),
            "sid" => sid = Some(value.into_owned()),
            _ => {}
        }
    }

    let version = version
        .ok_or_else(|| ProtocolError::InvalidRequest(constants::ERR_MISSING_VERSION.into()))?;
    if version.parse::<u8>().ok() != Some(PROTOCOL_VERSION) {
        debug!(version = %version, "Rejected protocol version");
        return Err(ProtocolError::InvalidRequest(
            constants::ERR_UNSUPPORTED_VERSION.into(),
        ));
    }

    let transport = transport
        .ok_or_else(|| ProtocolError::InvalidRequest(constants::ERR_MISSING_TRANSPORT.into()))?;
    let transport = TransportKind::from_name(&transport)?;

    Ok(HandshakeQuery {
        transport,
        sid: sid.filter(|s| !s.is_empty()),
    })
}

/// Reject transports switched off in configuration
pub fn ensure_enabled(kind: TransportKind, config: &EngineConfig) -> Result<()> {
    let enabled = match kind {
        TransportKind::Polling => config.transport.allow_polling,
        TransportKind::Websocket => config.transport.allow_websocket,
    };
    if enabled {
        Ok(())
    } else {
        Err(ProtocolError::InvalidRequest(
            constants::ERR_TRANSPORT_DISABLED.into(),
        ))
    }
}

/// Session parameters advertised in the `open` packet
pub fn session_config(kind: TransportKind, config: &EngineConfig) -> SessionConfig {
    SessionConfig {
        ping_interval: config.server.ping_interval,
        ping_timeout: config.server.ping_timeout,
        max_payload: config.transport.max_payload,
        upgrades: config.transport.upgrades_for(kind),
    }
}

pub fn client_config(config: &EngineConfig) -> ClientConfig {
    ClientConfig {
        connect_timeout: config.server.connect_timeout,
        ack_timeout: config.server.ack_timeout,
        max_attachments: config.transport.max_attachments,
    }
}
