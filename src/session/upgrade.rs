//! Transport upgrade from polling to socket.
//!
//! ```text
//! client                         server
//!   | -- dial socket (sid) -------> |  Open -> Upgrading
//!   | -- 2probe (socket) ---------> |
//!   | <-------- 3probe (socket) --- |  pending poll released with 6
//!   | -- 5 (socket) --------------> |  queued polling packets moved, Upgraded
//! ```
//!
//! Until `upgrade` arrives every outbound packet still goes through the polling
//! transport. If the sequence does not complete within the ping timeout the
//! socket is dropped and the session stays on polling.

use crate::core::packet::{Packet, PROBE};
use crate::error::{constants, ProtocolError, Result};
use crate::session::{Link, Session};
use crate::transport::{SocketTransport, Transport, TransportId};
use std::sync::Arc;
use tracing::{debug, info, trace};

impl Session {
    /// Attach a freshly dialed socket as the upgrade candidate
    pub(crate) fn attach_upgrade(self: &Arc<Self>, socket: SocketTransport) -> Result<()> {
        if self.config.upgrades.is_empty() {
            return Err(ProtocolError::Upgrade(constants::ERR_UPGRADE_NOT_ALLOWED.into()));
        }

        let probe_id = socket.id();
        {
            let mut link = self.link.lock();
            match std::mem::replace(&mut *link, Link::Closed) {
                Link::Open(Transport::Polling(old)) => {
                    *link = Link::Upgrading {
                        old,
                        new: socket,
                        probed: false,
                    };
                }
                other => {
                    let error = match &other {
                        Link::Upgrading { .. } => {
                            ProtocolError::Upgrade(constants::ERR_ALREADY_UPGRADING.into())
                        }
                        Link::Upgraded(_) | Link::Open(Transport::Socket(_)) => {
                            ProtocolError::Upgrade(constants::ERR_ALREADY_UPGRADED.into())
                        }
                        _ => ProtocolError::UnknownSession,
                    };
                    *link = other;
                    return Err(error);
                }
            }
        }

        debug!(sid = %self.id, transport_id = probe_id, "Upgrade started");
        self.spawn_upgrade_deadline(probe_id);
        Ok(())
    }

    fn spawn_upgrade_deadline(self: &Arc<Self>, probe_id: TransportId) {
        let weak = Arc::downgrade(self);
        let cancel = self.cancel.clone();
        let deadline = self.config.ping_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                _ = tokio::time::sleep(deadline) => {
                    if let Some(session) = weak.upgrade() {
                        session.abandon_upgrade(probe_id, constants::ERR_UPGRADE_TIMEOUT);
                    }
                }
            }
        });
    }

    /// Packets arriving on the upgrade candidate
    pub(super) fn on_probe_packet(self: &Arc<Self>, probe_id: TransportId, packet: Packet) {
        match packet {
            Packet::Ping(_) if packet.is_probe() => self.answer_probe(probe_id),
            Packet::Upgrade => self.complete_upgrade(probe_id),
            Packet::Noop | Packet::Pong(_) => {
                trace!(sid = %self.id, "Ignoring packet on probe transport");
            }
            other => {
                debug!(sid = %self.id, packet = ?other.packet_type(), "Unexpected packet during upgrade");
                self.abandon_upgrade(probe_id, constants::ERR_UNEXPECTED_PACKET);
            }
        }
    }

    fn answer_probe(&self, probe_id: TransportId) {
        let mut link = self.link.lock();
        let Link::Upgrading { old, new, probed } = &mut *link else {
            return;
        };
        if new.id() != probe_id {
            return;
        }
        if let Err(e) = new.send(vec![Packet::Pong(Some(PROBE.into()))]) {
            trace!(sid = %self.id, error = %e, "Probe reply failed");
            return;
        }
        *probed = true;

        // Let the client's outstanding GET return so it can send `upgrade`
        if old.has_pending_poll() {
            let _ = old.send(vec![Packet::Noop]);
        }
    }

    fn complete_upgrade(self: &Arc<Self>, probe_id: TransportId) {
        let mut link = self.link.lock();
        match std::mem::replace(&mut *link, Link::Closed) {
            Link::Upgrading { old, new, probed: true } if new.id() == probe_id => {
                let pending = old.drain();
                let moved = pending.len();
                if let Err(e) = new.send(pending) {
                    trace!(sid = %self.id, error = %e, "Flushing queued packets failed");
                }
                old.close();
                *link = Link::Upgraded(new);
                drop(link);

                self.metrics.upgrade_completed();
                info!(sid = %self.id, moved, "Session upgraded to websocket");
            }
            other => {
                *link = other;
                drop(link);
                self.abandon_upgrade(probe_id, constants::ERR_UPGRADE_WITHOUT_PROBE);
            }
        }
    }

    /// Drop the upgrade candidate and keep the session on polling
    pub(super) fn abandon_upgrade(&self, probe_id: TransportId, cause: &str) {
        let mut link = self.link.lock();
        match std::mem::replace(&mut *link, Link::Closed) {
            Link::Upgrading { old, new, .. } if new.id() == probe_id => {
                new.close();
                *link = Link::Open(Transport::Polling(old));
                drop(link);

                self.metrics.upgrade_abandoned();
                debug!(sid = %self.id, cause, "Upgrade abandoned");
            }
            other => *link = other,
        }
    }
}
