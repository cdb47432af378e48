//! # Realtime Protocol
//!
//! A bidirectional real-time messaging engine in two layers.
//!
//! The **transport layer** keeps one logical session alive across HTTP
//! long-polling and a persistent socket connection. It handles the handshake,
//! the server-driven heartbeat and the live upgrade from polling to socket
//! without losing or duplicating packets.
//!
//! The **multiplex layer** runs on top of a session. It routes namespaced
//! events, request/response acknowledgements and binary attachments to
//! handlers registered on [`Namespace`]s.
//!
//! ## Modules
//! - [`core`]: transport packet codec, polling batches, frame codec
//! - [`transport`]: polling and socket transports, WebSocket adapter
//! - [`session`]: session state machine, heartbeat, upgrade, registry
//! - [`protocol`]: application packets, namespaces, logical sockets, acks
//! - [`service`]: the [`Server`] facade
//! - [`config`], [`error`], [`utils`]: ambient stack
//!
//! ## Quick Start
//! ```rust,no_run
//! use realtime_protocol::{EngineConfig, Server};
//! use realtime_protocol::transport::websocket;
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> realtime_protocol::Result<()> {
//! let server = Server::new(EngineConfig::default())?;
//! server.main_namespace().on("message", |socket, args, _| {
//!     let _ = socket.emit("message-back", args);
//! });
//!
//! let listener = TcpListener::bind("127.0.0.1:3000").await?;
//! loop {
//!     let (stream, _) = listener.accept().await?;
//!     let server = server.clone();
//!     tokio::spawn(async move {
//!         if let Ok((frames, query)) = websocket::accept_with_query(stream).await {
//!             let _ = server.handle_socket(&query, frames).await;
//!         }
//!     });
//! }
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod session;
pub mod transport;
pub mod utils;

pub use config::EngineConfig;
pub use error::{ProtocolError, Result};
pub use protocol::{AckSender, Data, DisconnectReason, Namespace, Socket};
pub use service::{EngineRequest, EngineResponse, Server};
pub use session::{CloseReason, Session, SessionState};
