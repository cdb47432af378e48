//! Timing constants and async timeout helpers.

use crate::error::{ProtocolError, Result};
use std::future::Future;
use std::time::Duration;

/// Default interval between server pings
pub const PING_INTERVAL: Duration = Duration::from_secs(25);

/// Default grace period for a pong after each ping
pub const PING_TIMEOUT: Duration = Duration::from_secs(20);

/// Default time a session may stay without a namespace connection
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(45);

/// Default age after which pending outgoing acks are dropped
pub const ACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `fut`, failing with `err` if it does not finish within `duration`
pub async fn with_timeout<F, T>(fut: F, duration: Duration, err: ProtocolError) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(duration, fut).await {
        Ok(res) => res,
        Err(_) => Err(err),
    }
}
