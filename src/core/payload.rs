//! # Polling Payload Framing
//!
//! One polling request or response body may carry several packets, joined by
//! the ASCII record separator (`0x1e`). Binary packets are embedded as `b`
//! followed by the standard base64 encoding of their bytes:
//!
//! ```text
//! 2\x1e42["event"]\x1ebAQID
//! ```

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;

/// Separator between packets in a polling body
pub const SEPARATOR: char = '\x1e';

/// Prefix marking a base64-encoded binary packet in a polling body
const BINARY_PREFIX: char = 'b';

/// Encode a batch of packets into one polling body
pub fn encode_batch(packets: &[Packet]) -> String {
    let mut out = String::new();
    for (i, packet) in packets.iter().enumerate() {
        if i > 0 {
            out.push(SEPARATOR);
        }
        match packet {
            Packet::Binary(bytes) => {
                out.push(BINARY_PREFIX);
                out.push_str(&STANDARD.encode(bytes));
            }
            other => out.push_str(&other.encode_text().unwrap_or_default()),
        }
    }
    out
}

/// Decode a polling body into its packets.
///
/// Bodies above `max_payload` bytes are rejected before parsing.
pub fn decode_batch(body: &[u8], max_payload: usize) -> Result<Vec<Packet>> {
    if body.len() > max_payload {
        return Err(ProtocolError::OversizedPacket(body.len()));
    }
    let text = std::str::from_utf8(body)
        .map_err(|_| ProtocolError::Decode("polling body is not valid UTF-8".into()))?;
    if text.is_empty() {
        return Err(ProtocolError::Decode(constants::ERR_EMPTY_PACKET.into()));
    }

    text.split(SEPARATOR).map(decode_one).collect()
}

fn decode_one(raw: &str) -> Result<Packet> {
    match raw.strip_prefix(BINARY_PREFIX) {
        Some(encoded) => STANDARD
            .decode(encoded)
            .map(|bytes| Packet::Binary(Bytes::from(bytes)))
            .map_err(|_| ProtocolError::Decode(constants::ERR_INVALID_BASE64.into())),
        None => Packet::decode_text(raw),
    }
}
