//! # Frame Codec
//!
//! A [`Frame`] is one physical message of a duplex socket: either UTF-8 text or
//! raw bytes. WebSockets provide this framing natively (see
//! [`crate::transport::websocket`]); for plain byte streams (TCP, Unix sockets,
//! in-memory pipes) [`FrameCodec`] adds it:
//!
//! ```text
//! [Kind(1)] [Length(4, BE)] [Payload(N)]
//! ```
//!
//! Kind is `0x01` for text and `0x02` for binary. Frames longer than the
//! configured maximum are rejected before any allocation.

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

const KIND_TEXT: u8 = 0x01;
const KIND_BINARY: u8 = 0x02;
const HEADER_LEN: usize = 5;

/// One physical frame of the socket transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
}

impl Frame {
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(t) => t.len(),
            Frame::Binary(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_binary(&self) -> bool {
        matches!(self, Frame::Binary(_))
    }
}

/// Length-prefixed framing of [`Frame`]s over a byte stream
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_len: usize,
}

impl FrameCodec {
    pub fn new(max_frame_len: usize) -> Self {
        Self { max_frame_len }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = src[0];
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;

        if len > self.max_frame_len {
            return Err(ProtocolError::OversizedPacket(len));
        }
        if kind != KIND_TEXT && kind != KIND_BINARY {
            return Err(ProtocolError::Decode(format!("unknown frame kind {kind:#04x}")));
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();

        let frame = if kind == KIND_TEXT {
            let text = String::from_utf8(payload.to_vec())
                .map_err(|_| ProtocolError::Decode("text frame is not valid UTF-8".into()))?;
            Frame::Text(text)
        } else {
            Frame::Binary(payload)
        };
        Ok(Some(frame))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let len = frame.len();
        if len > self.max_frame_len {
            return Err(ProtocolError::OversizedPacket(len));
        }

        dst.reserve(HEADER_LEN + len);
        match frame {
            Frame::Text(text) => {
                dst.put_u8(KIND_TEXT);
                dst.put_u32(len as u32);
                dst.put_slice(text.as_bytes());
            }
            Frame::Binary(bytes) => {
                dst.put_u8(KIND_BINARY);
                dst.put_u32(len as u32);
                dst.put_slice(&bytes);
            }
        }
        Ok(())
    }
}
