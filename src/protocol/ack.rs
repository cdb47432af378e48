//! Outgoing acknowledgements.
//!
//! When the server emits with an ack, it allocates the next id on that logical
//! socket and parks a completion channel until the client's `ack` arrives.
//! Unanswered entries are never retried: they expire after `ack_timeout` and
//! their receivers observe cancellation.

use crate::protocol::data::Data;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug)]
struct PendingAck {
    tx: oneshot::Sender<Vec<Data>>,
    created_at: Instant,
}

/// Pending outgoing acks of one logical socket
#[derive(Debug)]
pub struct AckRegistry {
    next_id: Mutex<u64>,
    pending: Mutex<HashMap<u64, PendingAck>>,
    timeout: Duration,
}

impl AckRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: Mutex::new(0),
            pending: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Allocate an ack id and its completion channel
    pub fn register(&self) -> (u64, oneshot::Receiver<Vec<Data>>) {
        self.sweep();

        let id = {
            let mut next = self.next_id.lock();
            let id = *next;
            *next = next.wrapping_add(1);
            id
        };
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(
            id,
            PendingAck {
                tx,
                created_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Complete ack `id`. Returns false for unknown or expired ids.
    pub fn resolve(&self, id: u64, args: Vec<Data>) -> bool {
        match self.pending.lock().remove(&id) {
            Some(ack) => {
                let _ = ack.tx.send(args);
                true
            }
            None => {
                trace!(ack_id = id, "Ack for unknown id dropped");
                false
            }
        }
    }

    /// Drop entries older than the ack timeout
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut pending = self.pending.lock();
        let before = pending.len();
        pending.retain(|_, ack| now.duration_since(ack.created_at) < self.timeout);
        let expired = before - pending.len();
        if expired > 0 {
            trace!(expired, "Expired pending acks");
        }
        expired
    }

    /// Drop every pending entry
    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn resolve_completes_receiver() {
        let acks = AckRegistry::new(Duration::from_secs(5));
        let (id, rx) = acks.register();
        let (id2, _rx2) = acks.register();
        assert_ne!(id, id2);

        assert!(acks.resolve(id, vec![Data::from("ok")]));
        assert_eq!(rx.await.unwrap(), vec![Data::from("ok")]);
        assert!(!acks.resolve(id, Vec::new()));
        assert_eq!(acks.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_acks_are_swept() {
        let acks = AckRegistry::new(Duration::from_millis(100));
        let (id, rx) = acks.register();

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(acks.sweep(), 1);
        assert!(rx.await.is_err());
        assert!(!acks.resolve(id, Vec::new()));
    }

    #[tokio::test]
    async fn clear_cancels_everything() {
        let acks = AckRegistry::new(Duration::from_secs(5));
        let (_, rx) = acks.register();
        acks.clear();
        assert!(acks.is_empty());
        assert!(rx.await.is_err());
    }
}
