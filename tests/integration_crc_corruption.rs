//! End-to-end CRC32 corruption handling (spec §8 scenario 2).
//!
//! A transport wrapper flips the first payload byte of every inbound
//! envelope before the engine ever sees it, simulating corruption in
//! transit. The tag handler must not run, and the corruption counter in
//! `EngineMetrics` must advance by exactly one per corrupted message.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use rankmesh::config::EngineConfig;
use rankmesh::engine::Engine;
use rankmesh::message::Message;
use rankmesh::rank::Rank;
use rankmesh::registry::PluginInfo;
use rankmesh::tag::Tag;
use rankmesh::transport::loopback::{LoopbackFabric, LoopbackTransport};
use rankmesh::transport::{Envelope, TransportAdapter};

/// Wraps a [`LoopbackTransport`] and flips the first payload byte of every
/// envelope it delivers, so the CRC32 trailer written by the sender no
/// longer matches on receipt.
struct CorruptingTransport {
    inner: LoopbackTransport,
}

#[async_trait]
impl TransportAdapter for CorruptingTransport {
    async fn send(&self, envelopes: Vec<Envelope>) -> Result<()> {
        self.inner.send(envelopes).await
    }

    async fn receive(&mut self) -> Result<Vec<Envelope>> {
        let mut envelopes = self.inner.receive().await?;
        for (_, _, bytes) in envelopes.iter_mut() {
            if !bytes.is_empty() {
                bytes[0] ^= 0xFF;
            }
        }
        Ok(envelopes)
    }
}

#[tokio::test]
async fn corrupted_message_is_dropped_and_counted_not_dispatched() {
    let (_fabric, mut transports) = LoopbackFabric::new(2, 16);
    let t1 = CorruptingTransport { inner: transports.remove(1) };
    let t0 = transports.remove(0);

    let config = EngineConfig {
        pool_size: 2,
        crc_enabled: true,
        ..EngineConfig::default()
    };
    let mut e0 = Engine::new(config.clone(), Rank(0), Box::new(t0), Tag(0)).unwrap();
    let mut e1 = Engine::new(config, Rank(1), Box::new(t1), Tag(0)).unwrap();

    let plugin = e1.registry_mut().register_plugin(PluginInfo::default());
    let tag = e1.registry_mut().allocate_tag(plugin).unwrap();
    let invocations = Arc::new(AtomicUsize::new(0));
    let invocations_clone = invocations.clone();
    e1.registry_mut()
        .bind_tag_handler(plugin, tag, Box::new(move |_| {
            invocations_clone.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }))
        .unwrap();

    e0.send(Message::new(Rank(0), Rank(1), tag, vec![9; 16]));
    e0.tick().await.unwrap();
    e1.tick().await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 0, "handler must not run on a corrupted message");
    assert_eq!(e1.metrics().corrupted_messages_dropped(), 1);
}
