//! Binary attachment reassembly.
//!
//! A `binary_event`/`binary_ack` declares `N` attachments. The next `N` binary
//! packets of the session belong to it, in arrival order; only then are its
//! placeholders resolved and the packet dispatched.

use crate::config::MAX_ATTACHMENTS;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::data::Data;
use crate::protocol::message::{Message, MessageKind};
use bytes::Bytes;

/// An application packet whose payload is fully resolved
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub kind: MessageKind,
    pub namespace: String,
    pub id: Option<u64>,
    pub data: Option<Data>,
}

impl Inbound {
    /// Resolve placeholders of `message` against `attachments`
    pub fn resolve(message: Message, attachments: &[Bytes]) -> Result<Self> {
        let data = message
            .data
            .map(|value| Data::resolve(value, attachments))
            .transpose()?;
        Ok(Self {
            kind: message.kind,
            namespace: message.namespace,
            id: message.id,
            data,
        })
    }

    /// Payload items of an array payload (event name included for events)
    pub fn into_items(self) -> Vec<Data> {
        match self.data {
            Some(Data::Array(items)) => items,
            Some(other) => vec![other],
            None => Vec::new(),
        }
    }
}

#[derive(Debug)]
struct Pending {
    message: Message,
    received: Vec<Bytes>,
}

/// Per-session buffer holding at most one packet awaiting attachments
#[derive(Debug)]
pub struct AttachmentBuffer {
    pending: Option<Pending>,
    limit: usize,
}

impl Default for AttachmentBuffer {
    fn default() -> Self {
        Self::with_limit(MAX_ATTACHMENTS)
    }
}

impl AttachmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer rejecting packets that declare more than `limit` attachments
    pub fn with_limit(limit: usize) -> Self {
        Self {
            pending: None,
            limit,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Attachments still expected by the pending packet
    pub fn remaining(&self) -> usize {
        self.pending
            .as_ref()
            .map(|p| p.message.attachments - p.received.len())
            .unwrap_or(0)
    }

    /// Accept a decoded text packet.
    ///
    /// Packets without attachments resolve immediately. A packet declaring
    /// attachments is held; a second one while another is pending, or one
    /// declaring more than the limit, is an error.
    pub fn accept(&mut self, message: Message) -> Result<Option<Inbound>> {
        if message.attachments == 0 {
            return Inbound::resolve(message, &[]).map(Some);
        }
        if message.attachments > self.limit {
            return Err(ProtocolError::Decode(constants::ERR_TOO_MANY_ATTACHMENTS.into()));
        }
        if self.pending.is_some() {
            return Err(ProtocolError::Decode(constants::ERR_NESTED_ATTACHMENTS.into()));
        }
        self.pending = Some(Pending {
            message,
            received: Vec::new(),
        });
        Ok(None)
    }

    /// Accept one binary packet. Returns the completed packet once the last
    /// declared attachment arrives.
    pub fn push(&mut self, bytes: Bytes) -> Result<Option<Inbound>> {
        let pending = self
            .pending
            .as_mut()
            .ok_or_else(|| ProtocolError::Decode(constants::ERR_UNEXPECTED_BINARY.into()))?;
        pending.received.push(bytes);
        if pending.received.len() < pending.message.attachments {
            return Ok(None);
        }

        match self.pending.take() {
            Some(Pending { message, received }) => Inbound::resolve(message, &received).map(Some),
            None => Ok(None),
        }
    }

    /// Discard any partial packet
    pub fn clear(&mut self) {
        self.pending = None;
    }
}
