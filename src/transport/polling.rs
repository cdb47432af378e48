//! # Polling Transport
//!
//! Outbound packets are buffered until the client issues a pull (GET); the pull
//! completes as soon as at least one packet is available. Inbound packets
//! arrive through push (POST) bodies.
//!
//! At most one pull and one push may be in flight per session: an overlapping
//! request fails immediately with [`ProtocolError::ConcurrentPoll`] rather than
//! queueing behind the first one.

use crate::core::packet::Packet;
use crate::error::{constants, ProtocolError, Result};
use crate::transport::{next_transport_id, TransportId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::trace;

#[derive(Debug, Default)]
struct PollingShared {
    queue: Mutex<VecDeque<Packet>>,
    notify: Notify,
    pulling: AtomicBool,
    pushing: AtomicBool,
    closed: AtomicBool,
}

/// HTTP long-polling transport
#[derive(Debug)]
pub struct PollingTransport {
    id: TransportId,
    shared: Arc<PollingShared>,
}

impl Default for PollingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl PollingTransport {
    pub fn new() -> Self {
        Self {
            id: next_transport_id(),
            shared: Arc::new(PollingShared::default()),
        }
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    /// Handle used by request handlers to wait for outbound packets
    /// without holding the session lock.
    pub fn handle(&self) -> PollingHandle {
        PollingHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn send(&self, packets: Vec<Packet>) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.shared.queue.lock().extend(packets);
        self.shared.notify.notify_one();
        Ok(())
    }

    /// True while a pull request is waiting for data
    pub fn has_pending_poll(&self) -> bool {
        self.shared.pulling.load(Ordering::Acquire)
    }

    /// Remove every buffered outbound packet, oldest first
    pub fn drain(&self) -> Vec<Packet> {
        self.shared.queue.lock().drain(..).collect()
    }

    pub fn close(&self) {
        if !self.shared.closed.swap(true, Ordering::AcqRel) {
            trace!(transport_id = self.id, "Polling transport closed");
            self.shared.notify.notify_one();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }
}

/// Request-side view of a polling transport
#[derive(Debug, Clone)]
pub struct PollingHandle {
    shared: Arc<PollingShared>,
}

impl PollingHandle {
    /// Wait for the next outbound batch.
    ///
    /// Buffered packets are always delivered first; a pull pending when the
    /// transport closes completes with a single `noop`.
    pub async fn pull(&self) -> Result<Vec<Packet>> {
        let _guard = FlagGuard::acquire(&self.shared, Flag::Pull)?;
        loop {
            {
                let mut queue = self.shared.queue.lock();
                if !queue.is_empty() {
                    return Ok(queue.drain(..).collect());
                }
            }
            if self.shared.closed.load(Ordering::Acquire) {
                return Ok(vec![Packet::Noop]);
            }
            self.shared.notify.notified().await;
        }
    }

    /// Reserve the single inbound slot for the duration of one push
    pub fn begin_push(&self) -> Result<PushGuard> {
        Ok(PushGuard(FlagGuard::acquire(&self.shared, Flag::Push)?))
    }
}

/// Held while a push body is being processed
#[derive(Debug)]
pub struct PushGuard(#[allow(dead_code)] FlagGuard);

#[derive(Debug, Clone, Copy)]
enum Flag {
    Pull,
    Push,
}

#[derive(Debug)]
struct FlagGuard {
    shared: Arc<PollingShared>,
    flag: Flag,
}

impl FlagGuard {
    fn acquire(shared: &Arc<PollingShared>, flag: Flag) -> Result<Self> {
        let slot = match flag {
            Flag::Pull => &shared.pulling,
            Flag::Push => &shared.pushing,
        };
        if slot.swap(true, Ordering::AcqRel) {
            return Err(ProtocolError::ConcurrentPoll);
        }
        if shared.closed.load(Ordering::Acquire) && matches!(flag, Flag::Push) {
            slot.store(false, Ordering::Release);
            return Err(ProtocolError::InvalidRequest(
                constants::ERR_SESSION_CLOSED.into(),
            ));
        }
        Ok(Self {
            shared: Arc::clone(shared),
            flag,
        })
    }
}

impl Drop for FlagGuard {
    fn drop(&mut self) {
        let slot = match self.flag {
            Flag::Pull => &self.shared.pulling,
            Flag::Push => &self.shared.pushing,
        };
        slot.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn pull_returns_buffered_packets_in_order() {
        let t = PollingTransport::new();
        t.send(vec![Packet::Ping(None), Packet::Message("2[\"a\"]".into())])
            .unwrap();
        let batch = t.handle().pull().await.unwrap();
        assert_eq!(
            batch,
            vec![Packet::Ping(None), Packet::Message("2[\"a\"]".into())]
        );
    }

    #[tokio::test]
    async fn pull_waits_until_a_packet_is_sent() {
        let t = PollingTransport::new();
        let handle = t.handle();
        let waiter = tokio::spawn(async move { handle.pull().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(t.has_pending_poll());
        t.send(vec![Packet::Ping(None)]).unwrap();

        let batch = waiter.await.unwrap().unwrap();
        assert_eq!(batch, vec![Packet::Ping(None)]);
        assert!(!t.has_pending_poll());
    }

    #[tokio::test]
    async fn second_concurrent_pull_is_rejected() {
        let t = PollingTransport::new();
        let first = t.handle();
        let waiter = tokio::spawn(async move { first.pull().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let second = t.handle().pull().await;
        assert!(matches!(second, Err(ProtocolError::ConcurrentPoll)));

        t.close();
        assert_eq!(waiter.await.unwrap().unwrap(), vec![Packet::Noop]);
    }

    #[tokio::test]
    async fn close_flushes_queued_packets_before_noop() {
        let t = PollingTransport::new();
        t.send(vec![Packet::Close]).unwrap();
        t.close();
        assert_eq!(t.handle().pull().await.unwrap(), vec![Packet::Close]);
        assert!(t.send(vec![Packet::Noop]).is_err());
    }

    #[test]
    fn overlapping_push_is_rejected() {
        let t = PollingTransport::new();
        let guard = t.handle().begin_push().unwrap();
        assert!(matches!(
            t.handle().begin_push(),
            Err(ProtocolError::ConcurrentPoll)
        ));
        drop(guard);
        assert!(t.handle().begin_push().is_ok());
    }
}
