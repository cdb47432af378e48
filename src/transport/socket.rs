//! # Socket Transport
//!
//! Persistent duplex transport. Any connection that yields and accepts
//! [`Frame`]s can back it: a [`WebSocketFrames`](crate::transport::WebSocketFrames)
//! adapter, or a byte stream wrapped in `Framed<_, FrameCodec>`.
//!
//! Outbound packets are handed to a writer task through an unbounded channel so
//! that `send` never blocks while the session lock is held. Closing the
//! transport flushes what is already queued, then closes the sink.

use crate::core::codec::Frame;
use crate::core::packet::Packet;
use crate::error::{ProtocolError, Result};
use crate::transport::{next_transport_id, TransportId};
use futures::stream::SplitStream;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Inbound half of a socket connection, read by the owning session
pub type FrameReader<S> = SplitStream<S>;

/// Writer half of a persistent duplex connection
#[derive(Debug, Clone)]
pub struct SocketTransport {
    id: TransportId,
    tx: mpsc::UnboundedSender<Frame>,
    cancel: CancellationToken,
}

impl SocketTransport {
    /// Split `conn`, spawn its writer task, and return the transport together
    /// with the inbound half.
    pub fn spawn<S>(conn: S) -> (Self, FrameReader<S>)
    where
        S: Stream<Item = Result<Frame>> + Sink<Frame, Error = ProtocolError> + Send + 'static,
    {
        let (sink, stream) = conn.split();
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let id = next_transport_id();

        tokio::spawn(write_loop(id, sink, rx, cancel.clone()));

        (Self { id, tx, cancel }, stream)
    }

    pub fn id(&self) -> TransportId {
        self.id
    }

    pub fn send(&self, packets: Vec<Packet>) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(ProtocolError::ConnectionClosed);
        }
        for packet in packets {
            self.tx
                .send(packet.into_frame())
                .map_err(|_| ProtocolError::ConnectionClosed)?;
        }
        Ok(())
    }

    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.tx.is_closed()
    }
}

async fn write_loop<W>(
    id: TransportId,
    mut sink: W,
    mut rx: mpsc::UnboundedReceiver<Frame>,
    cancel: CancellationToken,
) where
    W: Sink<Frame, Error = ProtocolError> + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(frame).await {
                        debug!(transport_id = id, error = %e, "Socket write failed");
                        cancel.cancel();
                        return;
                    }
                }
                None => break,
            },
            _ = cancel.cancelled() => {
                while let Ok(frame) = rx.try_recv() {
                    if sink.feed(frame).await.is_err() {
                        break;
                    }
                }
                break;
            }
        }
    }

    if let Err(e) = sink.close().await {
        trace!(transport_id = id, error = %e, "Socket close failed");
    }
    trace!(transport_id = id, "Socket writer stopped");
}
