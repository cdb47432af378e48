//! # Service Layer
//!
//! The engine facade. [`Server`] ties the session registry, the namespaces and
//! the metrics together and exposes the two entry points an embedder wires to
//! its network stack: polling requests and persistent socket connections.

pub mod request;
pub mod server;

pub use request::{EngineRequest, EngineResponse, Method};
pub use server::Server;
