//! # Transport-Layer Packets
//!
//! A packet on the wire is a single ASCII digit followed by an optional payload:
//!
//! ```text
//! 0{"sid":"...","upgrades":[],...}   open
//! 1                                   close
//! 2probe                              ping (optional payload)
//! 3probe                              pong (optional payload)
//! 4hello                              message
//! 5                                   upgrade
//! 6                                   noop
//! ```
//!
//! Binary messages carry no prefix on transports that support binary frames;
//! see [`crate::core::payload`] for how the polling transport embeds them.

use crate::core::codec::Frame;
use crate::error::{constants, ProtocolError, Result};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Payload of a probe ping/pong during transport upgrade
pub const PROBE: &str = "probe";

/// Transport packet kinds and their wire digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Open,
    Close,
    Ping,
    Pong,
    Message,
    Upgrade,
    Noop,
}

impl PacketType {
    /// Wire digit of this packet kind
    pub fn as_char(self) -> char {
        match self {
            PacketType::Open => '0',
            PacketType::Close => '1',
            PacketType::Ping => '2',
            PacketType::Pong => '3',
            PacketType::Message => '4',
            PacketType::Upgrade => '5',
            PacketType::Noop => '6',
        }
    }

    /// Parse a wire digit
    pub fn from_char(c: char) -> Result<Self> {
        match c {
            '0' => Ok(PacketType::Open),
            '1' => Ok(PacketType::Close),
            '2' => Ok(PacketType::Ping),
            '3' => Ok(PacketType::Pong),
            '4' => Ok(PacketType::Message),
            '5' => Ok(PacketType::Upgrade),
            '6' => Ok(PacketType::Noop),
            other => Err(ProtocolError::InvalidPacketType(other)),
        }
    }
}

/// Handshake record carried by the `open` packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OpenPayload {
    pub sid: String,
    pub upgrades: Vec<String>,
    /// Milliseconds
    pub ping_interval: u64,
    /// Milliseconds
    pub ping_timeout: u64,
    /// Bytes
    pub max_payload: u64,
}

impl OpenPayload {
    fn to_json(&self) -> String {
        serde_json::json!({
            "sid": self.sid,
            "upgrades": self.upgrades,
            "pingInterval": self.ping_interval,
            "pingTimeout": self.ping_timeout,
            "maxPayload": self.max_payload,
        })
        .to_string()
    }

    fn from_json(raw: &str) -> Result<Self> {
        let payload: OpenPayload = serde_json::from_str(raw)
            .map_err(|e| ProtocolError::Decode(format!("{}: {e}", constants::ERR_INVALID_OPEN)))?;
        if payload.sid.is_empty() {
            return Err(ProtocolError::Decode(constants::ERR_INVALID_OPEN.into()));
        }
        Ok(payload)
    }
}

/// A decoded transport-layer packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Open(OpenPayload),
    Close,
    Ping(Option<String>),
    Pong(Option<String>),
    /// Text message for the layer above
    Message(String),
    /// Raw binary message for the layer above
    Binary(Bytes),
    Upgrade,
    Noop,
}

impl Packet {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Open(_) => PacketType::Open,
            Packet::Close => PacketType::Close,
            Packet::Ping(_) => PacketType::Ping,
            Packet::Pong(_) => PacketType::Pong,
            Packet::Message(_) | Packet::Binary(_) => PacketType::Message,
            Packet::Upgrade => PacketType::Upgrade,
            Packet::Noop => PacketType::Noop,
        }
    }

    /// True for a `ping`/`pong` carrying the upgrade probe payload
    pub fn is_probe(&self) -> bool {
        matches!(self, Packet::Ping(Some(p)) | Packet::Pong(Some(p)) if p == PROBE)
    }

    /// Payload size in bytes, used for limits and metrics
    pub fn payload_len(&self) -> usize {
        match self {
            Packet::Message(s) => s.len(),
            Packet::Binary(b) => b.len(),
            Packet::Ping(Some(s)) | Packet::Pong(Some(s)) => s.len(),
            _ => 0,
        }
    }

    /// Text encoding of a non-binary packet. Returns `None` for [`Packet::Binary`].
    pub fn encode_text(&self) -> Option<String> {
        let digit = self.packet_type().as_char();
        let text = match self {
            Packet::Binary(_) => return None,
            Packet::Open(open) => format!("{digit}{}", open.to_json()),
            Packet::Ping(Some(data)) | Packet::Pong(Some(data)) => format!("{digit}{data}"),
            Packet::Message(data) => format!("{digit}{data}"),
            _ => digit.to_string(),
        };
        Some(text)
    }

    /// Decode one text-encoded packet
    pub fn decode_text(raw: &str) -> Result<Self> {
        let mut chars = raw.chars();
        let digit = chars
            .next()
            .ok_or_else(|| ProtocolError::Decode(constants::ERR_EMPTY_PACKET.into()))?;
        let data = chars.as_str();

        let optional = |data: &str| (!data.is_empty()).then(|| data.to_string());

        Ok(match PacketType::from_char(digit)? {
            PacketType::Open => Packet::Open(OpenPayload::from_json(data)?),
            PacketType::Close => Packet::Close,
            PacketType::Ping => Packet::Ping(optional(data)),
            PacketType::Pong => Packet::Pong(optional(data)),
            PacketType::Message => Packet::Message(data.to_string()),
            PacketType::Upgrade => Packet::Upgrade,
            PacketType::Noop => Packet::Noop,
        })
    }

    /// Map to a physical frame: one frame carries exactly one packet
    pub fn into_frame(self) -> Frame {
        match self {
            Packet::Binary(bytes) => Frame::Binary(bytes),
            other => Frame::Text(other.encode_text().unwrap_or_default()),
        }
    }

    /// Decode the packet carried by one physical frame
    pub fn from_frame(frame: Frame) -> Result<Self> {
        match frame {
            Frame::Text(text) => Packet::decode_text(&text),
            Frame::Binary(bytes) => Ok(Packet::Binary(bytes)),
        }
    }
}
