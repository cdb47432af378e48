//! # Multiplex Layer
//!
//! Namespaced events with acknowledgements and binary attachments, carried
//! inside transport `message` packets.
//!
//! ## Components
//! - **Message**: application packet grammar (`<type>[N-][/nsp,][id][json]`)
//! - **Data**: argument tree with binary leaves and placeholder handling
//! - **Binary**: reassembly of a placeholder packet and its attachments
//! - **Namespace**: statically configured routing domains and their handlers
//! - **Socket**: one client connection to one namespace
//! - **Client**: per-session multiplexer driving all of the above
//! - **Handshake**: query validation for incoming requests
//!
//! ## Flow
//! ```text
//! session message packet -> Message::decode -> AttachmentBuffer -> Client::route
//!     connect    -> Socket created, `40` reply, `auth` event, connect hooks
//!     event      -> Namespace dispatcher (with AckSender when an id is present)
//!     ack        -> pending AckRegistry entry resolved
//!     disconnect -> Socket removed, disconnect hooks
//! ```

pub mod ack;
pub mod binary;
pub mod client;
pub mod data;
pub mod dispatcher;
pub mod handshake;
pub mod message;
pub mod namespace;
pub mod socket;


pub use client::{Client, ClientConfig};
pub use data::Data;
pub use dispatcher::AckSender;
pub use message::{Message, MessageKind};
pub use namespace::{DisconnectReason, Namespace, NamespaceManager};
pub use socket::Socket;
