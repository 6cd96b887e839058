//! The per-rank cooperative tick loop (spec §4.1, §5).
//!
//! One [`Engine`] runs on one OS thread for one rank and never blocks:
//! each call to [`Engine::tick`] receives whatever is waiting, routes
//! overlay-stamped messages one hop closer or strips their stamp on
//! arrival, dispatches to tag/actor/mode handlers, lets the currently
//! active master/slave mode do its per-tick work, then encodes and sends
//! everything that step produced. Grounded in
//! `RayPlatform::core::ComputeCore::run`/`receiveMessages`/`processMessages`
//! /`sendMessages`, with the allocator-overflow and corruption handling
//! from the same file's message-loop error paths.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, trace, warn};

use crate::actor::{ActorId, Playground};
use crate::config::{EngineConfig, Topology};
use crate::error::EngineError;
use crate::graph::{CompleteGraph, ConnectionGraph, HypercubeGraph, RingGraph};
use crate::message::{self, Message};
use crate::metrics::EngineMetrics;
use crate::rank::Rank;
use crate::registry::Registry;
use crate::router::Router;
use crate::switch_man::{SwitchMan, NO_MASTER_MODE};
use crate::tag::Tag;
use crate::transport::{Envelope, TransportAdapter};

fn build_graph(topology: Topology, pool_size: usize) -> Box<dyn ConnectionGraph> {
    match topology {
        Topology::Complete => Box::new(CompleteGraph::new(pool_size)),
        Topology::Ring => Box::new(RingGraph::new(pool_size)),
        Topology::Hypercube { degree } => Box::new(HypercubeGraph::new(degree)),
    }
}

/// A single rank's runtime: the piece that owns the ring allocator, the
/// overlay router, the phase machine, and the dispatch tables, and drives
/// them through one tick at a time.
pub struct Engine {
    rank: Rank,
    config: EngineConfig,
    transport: Box<dyn TransportAdapter>,
    ring: crate::ring_allocator::RingAllocator,
    router: Router,
    switch_man: SwitchMan,
    registry: Registry,
    playground: Playground,
    metrics: EngineMetrics,
    outbox: Vec<Message>,
    debug_mode: Arc<AtomicBool>,
    stopping: bool,
}

impl Engine {
    /// `ack_tag` carries slave-mode completion acknowledgements to the
    /// master and is never exposed to plugin code. It is withheld from
    /// [`crate::registry::Registry::allocate_tag`] automatically, so any
    /// value works here without the caller having to pick one outside the
    /// application tag range by convention.
    pub fn new(
        config: EngineConfig,
        rank: Rank,
        transport: Box<dyn TransportAdapter>,
        ack_tag: Tag,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let graph = build_graph(config.topology, config.pool_size);
        let router = Router::new(graph, rank, config.drain_window);
        let ring = crate::ring_allocator::RingAllocator::new(config.ring_capacity, config.ring_slot_bytes);
        let switch_man = SwitchMan::new(config.pool_size, ack_tag);

        // Reserved before any plugin can register, so allocate_tag can
        // never sequentially hand out the ack tag to application code —
        // route_and_dispatch treats any message on the ack tag as a
        // completion ack rather than routing it to a tag handler.
        let mut registry = Registry::new();
        registry.reserve_tag(ack_tag);

        Ok(Self {
            rank,
            config,
            transport,
            ring,
            router,
            switch_man,
            registry,
            playground: Playground::new(rank),
            metrics: EngineMetrics::new(),
            outbox: Vec::new(),
            debug_mode: Arc::new(AtomicBool::new(false)),
            stopping: false,
        })
    }

    pub fn rank(&self) -> Rank {
        self.rank
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn switch_man_mut(&mut self) -> &mut SwitchMan {
        &mut self.switch_man
    }

    pub fn playground_mut(&mut self) -> &mut Playground {
        &mut self.playground
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// A clone of the shared flag a SIGUSR1 handler installed by
    /// [`Engine::run`] flips; exposed so callers can also flip it
    /// themselves (useful in tests, where sending a real signal is
    /// impractical).
    pub fn debug_mode_handle(&self) -> Arc<AtomicBool> {
        self.debug_mode.clone()
    }

    pub fn is_debug_mode(&self) -> bool {
        self.debug_mode.load(Ordering::Relaxed)
    }

    /// Queue the outbound messages for one rank's outgoing stamping pass.
    /// Handler callbacks return their replies here rather than writing
    /// to the transport directly, keeping encoding and allocation
    /// centralized in [`Engine::tick`].
    pub fn send(&mut self, message: Message) {
        self.outbox.push(message);
    }

    pub fn spawn_actor(&mut self, actor: Box<dyn crate::actor::Actor>) -> ActorId {
        self.playground.spawn(actor)
    }

    /// Ask the engine to wind down. The router keeps relaying in-flight
    /// overlay traffic for `drain_window` past this call; [`Engine::run`]
    /// exits once [`Router::drain_complete`] is true.
    pub fn stop(&mut self) {
        self.stopping = true;
        self.router.notify_stop();
    }

    /// Queue the first master mode's kickoff broadcast. Call once, before
    /// the first [`Engine::tick`], on the rank that is master — the
    /// "ready" transition inside `tick` only fires on a mode change, so
    /// the very first mode needs an explicit push to get the pool moving.
    pub fn kickoff(&mut self) -> Result<(), EngineError> {
        if self.rank.is_master() && self.switch_man.master_mode() != NO_MASTER_MODE {
            let messages = self.switch_man.open_master_mode(self.rank)?;
            self.outbox.extend(messages);
        }
        Ok(())
    }

    /// Run one receive-route-dispatch-tick-send cycle.
    pub async fn tick(&mut self) -> Result<(), EngineError> {
        let started = Instant::now();

        let inbound = self.receive_and_decode().await?;
        for message in inbound {
            self.route_and_dispatch(message)?;
        }

        if self.rank.is_master() && self.switch_man.all_ranks_are_ready() && self.switch_man.master_mode() != NO_MASTER_MODE
        {
            self.switch_man.close_master_mode()?;
            if self.switch_man.master_mode() != NO_MASTER_MODE {
                let messages = self.switch_man.open_master_mode(self.rank)?;
                self.outbox.extend(messages);
            } else {
                info!(rank = %self.rank, "master program reached its terminal mode");
                self.stop();
            }
        }

        if self.rank.is_master() {
            let messages = self.registry.tick_master_mode(self.switch_man.master_mode());
            self.outbox.extend(messages);
        }
        let messages = self.registry.tick_slave_mode(self.switch_man.slave_mode());
        self.outbox.extend(messages);

        self.stamp_allocate_and_send().await?;

        self.metrics.record_tick(started.elapsed().as_nanos() as u64);
        Ok(())
    }

    /// Run ticks until [`Engine::stop`] has been called and the router's
    /// drain window has elapsed. Installs a SIGUSR1 handler that flips
    /// [`Engine::debug_mode_handle`], mirroring `ComputeCore`'s runtime
    /// verbosity toggle.
    pub async fn run(&mut self) -> Result<(), EngineError> {
        let debug_flag = self.debug_mode.clone();
        let mut usr1 = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::user_defined1())
            .map_err(|e| EngineError::Configuration(format!("failed to install SIGUSR1 handler: {e}")))?;

        loop {
            tokio::select! {
                biased;
                _ = usr1.recv() => {
                    let now = !debug_flag.load(Ordering::Relaxed);
                    debug_flag.store(now, Ordering::Relaxed);
                    info!(rank = %self.rank, debug_mode = now, "toggled debug mode");
                }
                result = self.tick() => {
                    result?;
                    if self.stopping && self.router.drain_complete() {
                        break;
                    }
                }
            }
        }
        Ok(())
    }

    async fn receive_and_decode(&mut self) -> Result<Vec<Message>, EngineError> {
        let envelopes = self
            .transport
            .receive()
            .await
            .map_err(|e| EngineError::Routing(format!("transport receive failed: {e}")))?;

        let mut decoded = Vec::with_capacity(envelopes.len());
        for (source, tag, bytes) in envelopes {
            match message::decode(&bytes, bytes.len(), source, self.rank, tag, self.config.crc_enabled) {
                Ok(msg) => decoded.push(msg),
                Err(EngineError::Corruption { source, tag }) => {
                    warn!(%source, %tag, "dropping corrupted message");
                    self.metrics.record_corruption();
                }
                Err(other) => return Err(other),
            }
        }
        Ok(decoded)
    }

    fn route_and_dispatch(&mut self, message: Message) -> Result<(), EngineError> {
        let message = match message.routing {
            Some(stamp) if stamp.true_destination != self.rank => {
                trace!(from = %message.source, "relaying overlay message");
                let forwarded = self.router.forward(&message)?;
                self.outbox.push(forwarded);
                return Ok(());
            }
            Some(_) => {
                // arrived: strip the stamp and recover the application tag.
                let mut arrived = message;
                arrived.tag = arrived.tag.unrouted();
                arrived.routing = None;
                arrived
            }
            None => message,
        };

        if let Some(actor_stamp) = message.actor {
            let replies = self.playground.dispatch(ActorId(actor_stamp.destination_actor), &message);
            self.outbox.extend(replies);
            return Ok(());
        }

        if message.tag == self.switch_man.ack_tag() {
            self.switch_man.record_ack();
            return Ok(());
        }

        if self.switch_man.open_slave_mode_locally(message.tag).is_ok() {
            debug!(rank = %self.rank, tag = %message.tag, "entered slave mode from kickoff");
        }

        if let Some(replies) = self.registry.dispatch_tag(message.tag, &message) {
            self.metrics.record_dispatch(message.tag);
            self.outbox.extend(replies);
        } else {
            trace!(tag = %message.tag, "no handler registered for tag; message dropped");
        }
        Ok(())
    }

    async fn stamp_allocate_and_send(&mut self) -> Result<(), EngineError> {
        let pending: Vec<Message> = self.outbox.drain(..).collect();
        let mut outgoing_envelopes: Vec<Envelope> = Vec::with_capacity(pending.len());
        for mut outgoing in pending {
            self.router.stamp_if_needed(&mut outgoing)?;
            let allocation = self.ring.allocate(outgoing.tag);
            let slot = match allocation {
                Ok(slot) => slot,
                Err(err) => {
                    self.metrics.record_allocator_overflow();
                    self.ring.reset_count();
                    return Err(err);
                }
            };
            let written = message::encode(&outgoing, slot, self.config.crc_enabled)?;
            trace!(
                tag = %outgoing.tag,
                metadata_bytes = outgoing.metadata_len(),
                total_bytes = written,
                "encoded outbound message before handing it to the transport"
            );
            let bytes = slot[..written].to_vec();
            outgoing_envelopes.push((outgoing.destination, outgoing.tag, bytes));
        }
        self.ring.reset_count();

        if !outgoing_envelopes.is_empty() {
            self.transport
                .send(outgoing_envelopes)
                .await
                .map_err(|e| EngineError::Routing(format!("transport send failed: {e}")))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Topology;
    use crate::rank::MASTER_RANK;
    use crate::registry::PluginInfo;
    use crate::transport::loopback::LoopbackFabric;

    fn config(pool_size: usize) -> EngineConfig {
        EngineConfig {
            pool_size,
            topology: Topology::Complete,
            ..EngineConfig::default()
        }
    }

    #[tokio::test]
    async fn two_ranks_exchange_a_message_through_a_tag_handler() {
        let (_fabric, mut transports) = LoopbackFabric::new(2, 16);
        let t1 = transports.remove(1);
        let t0 = transports.remove(0);

        let mut e0 = Engine::new(config(2), Rank(0), Box::new(t0), Tag(0)).unwrap();
        let mut e1 = Engine::new(config(2), Rank(1), Box::new(t1), Tag(0)).unwrap();

        let plugin = e1.registry_mut().register_plugin(PluginInfo::default());
        let tag = e1.registry_mut().allocate_tag(plugin).unwrap();
        let received = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let received_clone = received.clone();
        e1.registry_mut()
            .bind_tag_handler(
                plugin,
                tag,
                Box::new(move |_msg| {
                    received_clone.store(true, std::sync::atomic::Ordering::SeqCst);
                    Vec::new()
                }),
            )
            .unwrap();

        e0.send(Message::new(Rank(0), Rank(1), tag, vec![9, 9, 9]));
        e0.tick().await.unwrap();
        e1.tick().await.unwrap();

        assert!(received.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn master_program_advances_once_every_rank_acks() {
        let (_fabric, mut transports) = LoopbackFabric::new(2, 16);
        let t1 = transports.remove(1);
        let t0 = transports.remove(0);

        let mut master = Engine::new(config(2), MASTER_RANK, Box::new(t0), Tag(0)).unwrap();
        let mut slave = Engine::new(config(2), Rank(1), Box::new(t1), Tag(0)).unwrap();

        for engine in [&mut master, &mut slave] {
            engine
                .switch_man_mut()
                .add_master_switch(crate::registry::MasterMode(1), Tag(5));
            engine
                .switch_man_mut()
                .add_next_master_mode(crate::registry::MasterMode(1), crate::switch_man::NO_MASTER_MODE);
            engine.switch_man_mut().add_slave_switch(Tag(5), crate::registry::SlaveMode(1));
        }
        master.switch_man_mut().set_first_master_mode(crate::registry::MasterMode(1));

        master.kickoff().unwrap();
        master.tick().await.unwrap(); // master sends kickoff to both ranks
        slave.tick().await.unwrap(); // slave receives kickoff, enters slave mode 1
        slave.send(slave.switch_man_mut().close_slave_mode_locally(Rank(1)));
        slave.tick().await.unwrap(); // slave sends ack to master
        master.tick().await.unwrap(); // master receives slave's ack (1 of 2)

        master.send(master.switch_man_mut().close_slave_mode_locally(MASTER_RANK));
        master.tick().await.unwrap(); // master sends its own ack
        master.tick().await.unwrap(); // master receives its own ack (2 of 2), advances

        assert_eq!(master.switch_man_mut().master_mode(), crate::switch_man::NO_MASTER_MODE);
    }
}
