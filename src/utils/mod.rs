//! # Utility Modules
//!
//! Supporting utilities for identifiers, logging, metrics, and timing.
//!
//! ## Components
//! - **Id**: URL-safe random identifiers for sessions and logical sockets
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe observability counters
//! - **Timeout**: Timing defaults and async timeout wrappers

pub mod id;
pub mod logging;
pub mod metrics;
pub mod timeout;

pub use metrics::{Metrics, MetricsSnapshot};
