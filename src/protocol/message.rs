//! # Application-Layer Messages
//!
//! Carried inside transport `message` packets:
//!
//! ```text
//! <type>[<attachments>-][<namespace>,][<ack id>][<json payload>]
//!
//! 0                                   connect to "/"
//! 0/admin,{"token":"123"}             connect to "/admin" with auth
//! 2["hello",1]                        event
//! 2/admin,12["hello"]                 event on "/admin" expecting ack 12
//! 312[true]                           ack 12
//! 51-["upload",{"_placeholder":true,"num":0}]
//! ```
//!
//! The namespace is omitted for the main namespace `/`. Binary variants declare
//! how many raw binary packets follow; see [`crate::protocol::binary`].

use crate::config::MAIN_NAMESPACE;
use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::data::{self, Data};
use bytes::Bytes;
use serde_json::Value;
use std::fmt::Write as _;

/// Application packet kinds and their wire digits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Connect,
    Disconnect,
    Event,
    Ack,
    ConnectError,
    BinaryEvent,
    BinaryAck,
}

impl MessageKind {
    pub fn as_char(self) -> char {
        match self {
            MessageKind::Connect => '0',
            MessageKind::Disconnect => '1',
            MessageKind::Event => '2',
            MessageKind::Ack => '3',
            MessageKind::ConnectError => '4',
            MessageKind::BinaryEvent => '5',
            MessageKind::BinaryAck => '6',
        }
    }

    pub fn from_char(c: char) -> Result<Self> {
        match c {
            '0' => Ok(MessageKind::Connect),
            '1' => Ok(MessageKind::Disconnect),
            '2' => Ok(MessageKind::Event),
            '3' => Ok(MessageKind::Ack),
            '4' => Ok(MessageKind::ConnectError),
            '5' => Ok(MessageKind::BinaryEvent),
            '6' => Ok(MessageKind::BinaryAck),
            other => Err(ProtocolError::InvalidPacketType(other)),
        }
    }

    /// Whether the wire form carries an attachment count
    pub fn is_binary(self) -> bool {
        matches!(self, MessageKind::BinaryEvent | MessageKind::BinaryAck)
    }
}

/// A decoded application packet. Binary payloads are still placeholders here.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub kind: MessageKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Value>,
    /// Number of binary packets following this one
    pub attachments: usize,
}

impl Message {
    fn new(kind: MessageKind, namespace: &str) -> Self {
        Self {
            kind,
            namespace: namespace.to_string(),
            id: None,
            data: None,
            attachments: 0,
        }
    }

    /// Successful namespace connect, carrying the namespace-scoped socket id
    pub fn connect(namespace: &str, socket_id: &str) -> Self {
        Self {
            data: Some(serde_json::json!({ "sid": socket_id })),
            ..Self::new(MessageKind::Connect, namespace)
        }
    }

    pub fn connect_error(namespace: &str, message: &str) -> Self {
        Self {
            data: Some(serde_json::json!({ "message": message })),
            ..Self::new(MessageKind::ConnectError, namespace)
        }
    }

    pub fn disconnect(namespace: &str) -> Self {
        Self::new(MessageKind::Disconnect, namespace)
    }

    /// Build an event; binary arguments are replaced by placeholders and
    /// returned in emission order.
    pub fn event(namespace: &str, event: &str, args: Vec<Data>, id: Option<u64>) -> (Self, Vec<Bytes>) {
        let mut items = Vec::with_capacity(args.len() + 1);
        items.push(Data::String(event.to_string()));
        items.extend(args);
        let (value, buffers) = data::deconstruct(Data::Array(items));

        let kind = if buffers.is_empty() {
            MessageKind::Event
        } else {
            MessageKind::BinaryEvent
        };
        let message = Self {
            id,
            data: Some(value),
            attachments: buffers.len(),
            ..Self::new(kind, namespace)
        };
        (message, buffers)
    }

    /// Build the acknowledgement of ack `id`
    pub fn ack(namespace: &str, id: u64, args: Vec<Data>) -> (Self, Vec<Bytes>) {
        let (value, buffers) = data::deconstruct(Data::Array(args));
        let kind = if buffers.is_empty() {
            MessageKind::Ack
        } else {
            MessageKind::BinaryAck
        };
        let message = Self {
            id: Some(id),
            data: Some(value),
            attachments: buffers.len(),
            ..Self::new(kind, namespace)
        };
        (message, buffers)
    }

    /// Text encoding of this packet (without the transport `4` prefix)
    pub fn encode(&self) -> String {
        let mut out = String::new();
        out.push(self.kind.as_char());
        if self.kind.is_binary() {
            let _ = write!(out, "{}-", self.attachments);
        }
        if self.namespace != MAIN_NAMESPACE {
            out.push_str(&self.namespace);
            out.push(',');
        }
        if let Some(id) = self.id {
            let _ = write!(out, "{id}");
        }
        if let Some(data) = &self.data {
            out.push_str(&data.to_string());
        }
        out
    }

    /// Transport packets for this message: the text packet followed by one
    /// binary packet per attachment.
    pub fn into_packets(self, attachments: Vec<Bytes>) -> Vec<Packet> {
        let mut packets = Vec::with_capacity(1 + attachments.len());
        packets.push(Packet::Message(self.encode()));
        packets.extend(attachments.into_iter().map(Packet::Binary));
        packets
    }

    /// Decode one text application packet
    pub fn decode(raw: &str) -> Result<Self> {
        let mut rest = raw;
        let kind = {
            let mut chars = rest.chars();
            let c = chars
                .next()
                .ok_or_else(|| ProtocolError::Decode(constants::ERR_EMPTY_PACKET.into()))?;
            rest = chars.as_str();
            MessageKind::from_char(c)?
        };

        let mut attachments = 0;
        if kind.is_binary() {
            let (count, tail) = rest
                .split_once('-')
                .ok_or_else(|| ProtocolError::Decode(constants::ERR_INVALID_ATTACHMENTS.into()))?;
            if count.is_empty() || !count.bytes().all(|b| b.is_ascii_digit()) {
                return Err(ProtocolError::Decode(constants::ERR_INVALID_ATTACHMENTS.into()));
            }
            attachments = count
                .parse()
                .map_err(|_| ProtocolError::Decode(constants::ERR_INVALID_ATTACHMENTS.into()))?;
            rest = tail;
        }

        let mut namespace = MAIN_NAMESPACE.to_string();
        if rest.starts_with('/') {
            match rest.split_once(',') {
                Some((nsp, tail)) => {
                    namespace = nsp.to_string();
                    rest = tail;
                }
                None => {
                    namespace = rest.to_string();
                    rest = "";
                }
            }
        }

        let digits = rest.bytes().take_while(u8::is_ascii_digit).count();
        let id = if digits > 0 {
            let id = rest[..digits]
                .parse::<u64>()
                .map_err(|_| ProtocolError::InvalidAckId)?;
            rest = &rest[digits..];
            Some(id)
        } else {
            None
        };

        let data = if rest.is_empty() {
            None
        } else {
            if rest.starts_with(|c: char| c.is_ascii_alphabetic()) {
                return Err(ProtocolError::InvalidAckId);
            }
            let value: Value = serde_json::from_str(rest)
                .map_err(|_| ProtocolError::Decode(constants::ERR_INVALID_PAYLOAD.into()))?;
            Some(value)
        };

        let message = Self {
            kind,
            namespace,
            id,
            data,
            attachments,
        };
        message.validate()?;
        Ok(message)
    }

    /// Structural payload rules per kind
    fn validate(&self) -> Result<()> {
        let valid = match (self.kind, &self.data) {
            (MessageKind::Connect, None) => true,
            (MessageKind::Connect, Some(data)) => data.is_object(),
            (MessageKind::Disconnect, data) => data.is_none(),
            (MessageKind::ConnectError, Some(data)) => data.is_string() || data.is_object(),
            (MessageKind::Event | MessageKind::BinaryEvent, Some(Value::Array(items))) => {
                matches!(items.first(), Some(Value::String(_)))
            }
            (MessageKind::Ack | MessageKind::BinaryAck, Some(Value::Array(_))) => self.id.is_some(),
            _ => false,
        };
        if valid {
            Ok(())
        } else {
            Err(ProtocolError::Decode(constants::ERR_INVALID_PAYLOAD.into()))
        }
    }

    /// Event name of an event packet
    pub fn event_name(&self) -> Option<&str> {
        match (&self.kind, &self.data) {
            (MessageKind::Event | MessageKind::BinaryEvent, Some(Value::Array(items))) => {
                items.first().and_then(Value::as_str)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_connect_variants() {
        let m = Message::decode("0").unwrap();
        assert_eq!(m.kind, MessageKind::Connect);
        assert_eq!(m.namespace, "/");
        assert!(m.data.is_none());

        let m = Message::decode(r#"0/custom,{"token":"abc"}"#).unwrap();
        assert_eq!(m.namespace, "/custom");
        assert_eq!(m.data, Some(json!({"token": "abc"})));

        // namespace without trailing comma
        let m = Message::decode("0/random").unwrap();
        assert_eq!(m.namespace, "/random");
    }

    #[test]
    fn decodes_event_with_ack_id() {
        let m = Message::decode(r#"2456["message-with-ack",1,"2",{"3":[false]}]"#).unwrap();
        assert_eq!(m.kind, MessageKind::Event);
        assert_eq!(m.id, Some(456));
        assert_eq!(m.event_name(), Some("message-with-ack"));
    }

    #[test]
    fn decodes_binary_event_header() {
        let m = Message::decode(
            r#"52-["message",{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#,
        )
        .unwrap();
        assert_eq!(m.kind, MessageKind::BinaryEvent);
        assert_eq!(m.attachments, 2);

        let m = Message::decode(r#"52-/custom,789["x"]"#).unwrap();
        assert_eq!(m.namespace, "/custom");
        assert_eq!(m.id, Some(789));
    }

    #[test]
    fn rejects_malformed_packets() {
        assert!(matches!(
            Message::decode("abc"),
            Err(ProtocolError::InvalidPacketType('a'))
        ));
        assert!(Message::decode("2{}").is_err());
        assert!(Message::decode("2[]").is_err());
        assert!(Message::decode("2[1]").is_err());
        assert!(Message::decode("1[]").is_err());
        assert!(Message::decode("3[1]").is_err());
        assert!(Message::decode("2[\"a\"").is_err());
        assert!(Message::decode("5[\"a\"]").is_err());
        assert!(Message::decode("5x-[\"a\"]").is_err());
        assert!(matches!(
            Message::decode(r#"2abc["message-with-ack",1]"#),
            Err(ProtocolError::InvalidAckId)
        ));
    }

    #[test]
    fn encodes_connect_reply_and_error() {
        assert_eq!(
            Message::connect("/", "xyz").encode(),
            r#"0{"sid":"xyz"}"#
        );
        assert_eq!(
            Message::connect_error("/random", "Invalid namespace").encode(),
            r#"4/random,{"message":"Invalid namespace"}"#
        );
        assert_eq!(Message::disconnect("/custom").encode(), "1/custom,");
        assert_eq!(Message::disconnect("/").encode(), "1");
    }

    #[test]
    fn event_preserves_argument_structure() {
        let args = vec![
            Data::from(1),
            Data::from("2"),
            Data::from(json!({"3": [true]})),
        ];
        let (m, buffers) = Message::event("/", "message-back", args, None);
        assert!(buffers.is_empty());
        assert_eq!(m.encode(), r#"2["message-back",1,"2",{"3":[true]}]"#);
    }

    #[test]
    fn binary_ack_uses_placeholders() {
        let args = vec![
            Data::Binary(Bytes::from_static(&[1, 2, 3])),
            Data::Binary(Bytes::from_static(&[4, 5, 6])),
        ];
        let (m, buffers) = Message::ack("/", 789, args);
        assert_eq!(
            m.encode(),
            r#"62-789[{"_placeholder":true,"num":0},{"_placeholder":true,"num":1}]"#
        );
        let packets = m.into_packets(buffers);
        assert_eq!(packets.len(), 3);
        assert_eq!(packets[1], Packet::Binary(Bytes::from_static(&[1, 2, 3])));
    }
}
