//! # Core Protocol Components
//!
//! Low-level transport-layer packet handling and physical framing.
//!
//! This module provides the foundation of the engine: the seven transport
//! packet kinds, the polling batch format, and the frame codec used by the
//! socket transport.
//!
//! ## Components
//! - **Packet**: transport packet kinds (open, close, ping, pong, message, upgrade, noop)
//! - **Payload**: separator-delimited polling batches with base64 binary packets
//! - **Codec**: text/binary frames and a Tokio codec for framing them over byte streams
//!
//! ## Wire Format
//! ```text
//! [Type digit] [Payload (optional)]
//! ```
//!
//! ## Limits
//! - Bodies and frames above `max_payload` are rejected before parsing

pub mod codec;
pub mod packet;
pub mod payload;

pub use codec::{Frame, FrameCodec};
pub use packet::{OpenPayload, Packet, PacketType, PROBE};
