//! Heartbeat timer.
//!
//! Every `ping_interval` the server sends `ping` and waits up to
//! `ping_timeout` for a `pong`. A pong arriving while no ping is outstanding
//! is ignored. Missing the deadline closes the session.

use crate::core::packet::Packet;
use crate::error::ProtocolError;
use crate::session::{CloseReason, Session};
use crate::utils::timeout::with_timeout;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Pong bookkeeping shared between the session and its timer task
#[derive(Debug, Default)]
pub struct Heartbeat {
    awaiting_pong: AtomicBool,
    pong: Notify,
}

impl Heartbeat {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a ping as outstanding
    fn expect_pong(&self) {
        self.awaiting_pong.store(true, Ordering::Release);
    }

    /// Record a pong. Returns false when no ping was outstanding.
    pub fn on_pong(&self) -> bool {
        if self.awaiting_pong.swap(false, Ordering::AcqRel) {
            self.pong.notify_one();
            true
        } else {
            false
        }
    }

    pub fn is_awaiting_pong(&self) -> bool {
        self.awaiting_pong.load(Ordering::Acquire)
    }
}

/// Start the heartbeat task of `session`. The task holds only a weak
/// reference and stops when the session closes.
pub(crate) fn spawn(session: &Arc<Session>) {
    let weak = Arc::downgrade(session);
    let heartbeat = Arc::clone(&session.heartbeat);
    let cancel = session.cancel.clone();
    let interval = session.config.ping_interval;
    let timeout = session.config.ping_timeout;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }

            {
                let Some(session) = weak.upgrade() else { return };
                heartbeat.expect_pong();
                if let Err(e) = session.send(vec![Packet::Ping(None)]) {
                    trace!(sid = %session.id, error = %e, "Heartbeat stopped");
                    return;
                }
                session.handler.on_tick(&session);
            }

            let pong = with_timeout(
                async {
                    heartbeat.pong.notified().await;
                    Ok(())
                },
                timeout,
                ProtocolError::PingTimeout,
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                res = pong => {
                    if let Err(e) = res {
                        if let Some(session) = weak.upgrade() {
                            debug!(sid = %session.id, error = %e, "Ping timeout");
                            session.close(CloseReason::PingTimeout);
                        }
                        return;
                    }
                }
            }
        }
    });
}
