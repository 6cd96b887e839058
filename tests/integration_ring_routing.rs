//! End-to-end overlay routing over a ring of four (spec §8 scenario 1).
//!
//! Rank 0 is not directly connected to rank 2 on a ring, so a message
//! between them must be stamped, relayed once by rank 1, and stripped back
//! to its original tag on arrival.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rankmesh::config::{EngineConfig, Topology};
use rankmesh::engine::Engine;
use rankmesh::message::Message;
use rankmesh::rank::Rank;
use rankmesh::registry::PluginInfo;
use rankmesh::tag::Tag;
use rankmesh::transport::loopback::LoopbackFabric;

fn ring_config() -> EngineConfig {
    EngineConfig {
        pool_size: 4,
        topology: Topology::Ring,
        ..EngineConfig::default()
    }
}

#[tokio::test]
async fn two_hop_route_over_ring_of_four_delivers_exactly_once() {
    let (_fabric, mut transports) = LoopbackFabric::new(4, 16);
    let t3 = transports.remove(3);
    let t2 = transports.remove(2);
    let t1 = transports.remove(1);
    let t0 = transports.remove(0);

    let mut e0 = Engine::new(ring_config(), Rank(0), Box::new(t0), Tag(0)).unwrap();
    let mut e1 = Engine::new(ring_config(), Rank(1), Box::new(t1), Tag(0)).unwrap();
    let mut e2 = Engine::new(ring_config(), Rank(2), Box::new(t2), Tag(0)).unwrap();
    let mut e3 = Engine::new(ring_config(), Rank(3), Box::new(t3), Tag(0)).unwrap();

    let plugin = e2.registry_mut().register_plugin(PluginInfo::default());
    let tag = e2.registry_mut().allocate_tag(plugin).unwrap();

    let invocations = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let delivered_source = Arc::new(std::sync::Mutex::new(None));
    let invocations_clone = invocations.clone();
    let delivered_source_clone = delivered_source.clone();
    e2.registry_mut()
        .bind_tag_handler(
            plugin,
            tag,
            Box::new(move |msg| {
                invocations_clone.fetch_add(1, Ordering::SeqCst);
                *delivered_source_clone.lock().unwrap() = Some((msg.source, msg.payload.clone()));
                Vec::new()
            }),
        )
        .unwrap();

    e0.send(Message::new(Rank(0), Rank(2), tag, vec![0xAB]));

    // One tick per hop is enough: rank 0 stamps and sends to rank 1, rank 1
    // relays to rank 2, rank 2 strips the stamp and dispatches.
    e0.tick().await.unwrap();
    e1.tick().await.unwrap();
    e2.tick().await.unwrap();
    // drain remaining ranks so no leftover traffic is mistaken for a bug.
    e3.tick().await.unwrap();

    assert_eq!(invocations.load(Ordering::SeqCst), 1, "handler must run exactly once");
    let (source, payload) = delivered_source.lock().unwrap().clone().unwrap();
    assert_eq!(source, Rank(0), "delivered message must carry the true source, not the relaying hop");
    assert_eq!(payload, vec![0xAB]);
}

#[tokio::test]
async fn directly_connected_ring_neighbors_need_no_relay() {
    let (_fabric, mut transports) = LoopbackFabric::new(4, 16);
    let t1 = transports.remove(1);
    let t0 = transports.remove(0);

    let mut e0 = Engine::new(ring_config(), Rank(0), Box::new(t0), Tag(0)).unwrap();
    let mut e1 = Engine::new(ring_config(), Rank(1), Box::new(t1), Tag(0)).unwrap();

    let plugin = e1.registry_mut().register_plugin(PluginInfo::default());
    let tag = e1.registry_mut().allocate_tag(plugin).unwrap();
    let received = Arc::new(AtomicBool::new(false));
    let received_clone = received.clone();
    e1.registry_mut()
        .bind_tag_handler(plugin, tag, Box::new(move |_| {
            received_clone.store(true, Ordering::SeqCst);
            Vec::new()
        }))
        .unwrap();

    e0.send(Message::new(Rank(0), Rank(1), tag, vec![1]));
    e0.tick().await.unwrap();
    e1.tick().await.unwrap();

    assert!(received.load(Ordering::SeqCst));
}
