//! The boundary between the engine and whatever carries bytes between ranks.
//!
//! [`TransportAdapter`] is deliberately thin: a rank's tick never blocks on
//! I/O, so `receive` must return immediately with whatever is already
//! available (possibly nothing) and `send` must not wait for the peer to
//! acknowledge receipt. Grounded in `IpcTransport`
//! (`redhat-performance-rusty-comms/src/ipc/mod.rs`), reduced to the two
//! operations a rank's tick actually needs and stripped of that trait's
//! server/client handshake split, which has no counterpart in an SPMD pool
//! where every rank is a peer.

use anyhow::Result;
use async_trait::async_trait;

use crate::rank::Rank;
use crate::tag::Tag;

/// One encoded wire message alongside the out-of-band fields a real
/// transport (MPI's `MPI_Send`/`MPI_Recv`, this crate's loopback fixture)
/// carries beside the buffer rather than inside it: the rank it came from
/// or is going to, and its application tag. Mirrors spec §6 — tag,
/// source, and destination are never encoded into the wire bytes
/// themselves.
pub type Envelope = (Rank, Tag, Vec<u8>);

#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Hand `envelopes` off for delivery. Returns once they are queued for
    /// transmission, not once they are delivered.
    async fn send(&self, envelopes: Vec<Envelope>) -> Result<()>;

    /// Return at most one inbound envelope, the one at the head of the
    /// queue; an empty vec means nothing is ready yet. Must not block
    /// waiting for one to arrive. The engine calls this once per tick, so
    /// an implementation backed by a deeper queue should leave anything
    /// beyond the head buffered for a later call rather than draining it
    /// here.
    async fn receive(&mut self) -> Result<Vec<Envelope>>;
}

pub mod loopback {
    //! An in-process transport over `tokio::sync::mpsc`, for tests and the
    //! demo binary. Not a production transport — it only connects ranks
    //! that share one process (spec §4.9).

    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::{Envelope, TransportAdapter};
    use crate::rank::Rank;
    use crate::tag::Tag;

    /// Builds one connected [`LoopbackTransport`] per rank. All transports
    /// built from the same fabric can reach each other; transports from
    /// different fabrics cannot.
    pub struct LoopbackFabric {
        senders: Arc<Vec<mpsc::Sender<Envelope>>>,
    }

    impl LoopbackFabric {
        /// `capacity` bounds each rank's inbox; a full inbox makes `send`
        /// return an error rather than block, consistent with the
        /// non-blocking contract `TransportAdapter::send` promises its
        /// caller it will honor quickly.
        pub fn new(size: usize, capacity: usize) -> (Self, Vec<LoopbackTransport>) {
            let mut senders = Vec::with_capacity(size);
            let mut receivers = Vec::with_capacity(size);
            for _ in 0..size {
                let (tx, rx) = mpsc::channel(capacity);
                senders.push(tx);
                receivers.push(rx);
            }
            let senders = Arc::new(senders);
            let transports = receivers
                .into_iter()
                .enumerate()
                .map(|(rank, rx)| LoopbackTransport {
                    self_rank: Rank(rank as u32),
                    senders: senders.clone(),
                    inbox: rx,
                })
                .collect();
            (Self { senders }, transports)
        }

        pub fn size(&self) -> usize {
            self.senders.len()
        }
    }

    pub struct LoopbackTransport {
        self_rank: Rank,
        senders: Arc<Vec<mpsc::Sender<Envelope>>>,
        inbox: mpsc::Receiver<Envelope>,
    }

    #[async_trait]
    impl TransportAdapter for LoopbackTransport {
        async fn send(&self, envelopes: Vec<Envelope>) -> Result<()> {
            for (destination, tag, bytes) in envelopes {
                let sender = self
                    .senders
                    .get(destination.as_usize())
                    .ok_or_else(|| anyhow!("rank {destination} is out of range for this fabric"))?;
                sender
                    .try_send((self.self_rank, tag, bytes))
                    .map_err(|e| anyhow!("loopback inbox for rank {destination} is full or closed: {e}"))?;
            }
            Ok(())
        }

        async fn receive(&mut self) -> Result<Vec<Envelope>> {
            // Spec: the engine asks for at most one inbound message per
            // tick and the inbox capacity is exactly 1. Anything beyond
            // the head of the queue stays buffered in the channel for a
            // later tick rather than being drained here.
            match self.inbox.try_recv() {
                Ok(envelope) => Ok(vec![envelope]),
                Err(_) => Ok(Vec::new()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn messages_sent_to_a_rank_arrive_at_its_transport() {
            let (_fabric, mut transports) = LoopbackFabric::new(3, 16);
            let mut receiver = transports.remove(2);
            let sender = transports.remove(0);

            sender.send(vec![(Rank(2), Tag(7), vec![1, 2, 3])]).await.unwrap();
            let received = receiver.receive().await.unwrap();
            assert_eq!(received, vec![(Rank(0), Tag(7), vec![1, 2, 3])]);
        }

        #[tokio::test]
        async fn receive_on_an_empty_inbox_returns_immediately_with_nothing() {
            let (_fabric, mut transports) = LoopbackFabric::new(2, 16);
            let mut t = transports.remove(0);
            assert_eq!(t.receive().await.unwrap(), Vec::new());
        }

        #[tokio::test]
        async fn sending_past_capacity_is_an_error_not_a_block() {
            let (_fabric, transports) = LoopbackFabric::new(2, 1);
            let sender = &transports[0];
            sender.send(vec![(Rank(1), Tag(0), vec![0])]).await.unwrap();
            let result = sender.send(vec![(Rank(1), Tag(0), vec![0])]).await;
            assert!(result.is_err());
        }
    }
}
