//! Overlay routing (spec §4.2).
//!
//! Lets a pair of ranks exchange messages even when the underlying
//! transport graph is not a full mesh, by stamping outbound messages whose
//! true destination isn't directly reachable and relaying inbound stamped
//! messages one hop closer until they arrive. Grounded in
//! `RayPlatform::MessageRouter`: `routeOutcomingMessages` here is
//! [`Router::stamp_if_needed`], `routeIncomingMessages`/`relayMessage`
//! is [`Router::forward`], and `hasCompletedRelayEvents` is
//! [`Router::drain_complete`].

use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::EngineError;
use crate::graph::ConnectionGraph;
use crate::message::{Message, RoutingStamp};
use crate::rank::Rank;

/// Default wall-clock window the router keeps relaying in-flight messages
/// after `stop()`, before the engine is allowed to exit (spec §4.2,
/// §9 Open Questions: exposed as configuration rather than hardcoded).
pub const DEFAULT_DRAIN_WINDOW: Duration = Duration::from_secs(16);

pub struct Router {
    graph: Box<dyn ConnectionGraph>,
    rank: Rank,
    drain_window: Duration,
    stopped_at: Option<Instant>,
}

impl Router {
    pub fn new(graph: Box<dyn ConnectionGraph>, rank: Rank, drain_window: Duration) -> Self {
        debug!(rank = %rank, "overlay router enabled");
        Self {
            graph,
            rank,
            drain_window,
            stopped_at: None,
        }
    }

    pub fn graph(&self) -> &dyn ConnectionGraph {
        self.graph.as_ref()
    }

    /// Notify the router that the engine has been asked to stop; the drain
    /// window starts now.
    pub fn notify_stop(&mut self) {
        if self.stopped_at.is_none() {
            self.stopped_at = Some(Instant::now());
        }
    }

    /// True once the drain window has elapsed since `notify_stop`. Before
    /// `notify_stop` is called, always false.
    pub fn drain_complete(&self) -> bool {
        match self.stopped_at {
            Some(at) => at.elapsed() >= self.drain_window,
            None => false,
        }
    }

    /// Stamp `message` for overlay delivery if its true source/destination
    /// aren't directly connected. A no-op (identity) if `message` already
    /// carries a routing stamp — stamping is idempotent within a hop.
    pub fn stamp_if_needed(&self, message: &mut Message) -> Result<(), EngineError> {
        if message.routing.is_some() {
            return Ok(());
        }
        let true_source = message.source;
        let true_destination = message.destination;

        // A rank can always reach itself without consulting the graph; the
        // graphs' own `is_connected` excludes self-loops (a rank is not its
        // own neighbor), so without this check a self-addressed message
        // would be sent through `next_rank_in_route`, which asserts the
        // destination isn't `self.rank`.
        if true_source == true_destination || self.graph.is_connected(true_source, true_destination) {
            return Ok(());
        }

        let next_hop = self.graph.next_rank_in_route(true_source, true_destination, self.rank);
        if next_hop == self.rank || next_hop.as_usize() >= self.graph.size() {
            return Err(EngineError::Routing(format!(
                "next hop {next_hop} from {} toward {} is invalid",
                self.rank, true_destination
            )));
        }

        message.routing = Some(RoutingStamp {
            true_source,
            true_destination,
        });
        message.tag = message.tag.routed();
        message.destination = next_hop;
        Ok(())
    }

    /// Build the next-hop copy of an inbound stamped message that has not
    /// yet reached its true destination. The original source/destination/
    /// tag recorded in the routing stamp are preserved untouched; only the
    /// transport-level `source`/`destination` change, to `self` and the
    /// next hop respectively.
    pub fn forward(&self, inbound: &Message) -> Result<Message, EngineError> {
        let stamp = inbound.routing.ok_or_else(|| {
            EngineError::Routing("forward() called on a message without a routing stamp".into())
        })?;

        let next_hop = self
            .graph
            .next_rank_in_route(stamp.true_source, stamp.true_destination, self.rank);
        if next_hop == self.rank || next_hop.as_usize() >= self.graph.size() {
            return Err(EngineError::Routing(format!(
                "next hop {next_hop} from {} toward {} is invalid",
                self.rank, stamp.true_destination
            )));
        }

        let mut forwarded = inbound.clone();
        forwarded.source = self.rank;
        forwarded.destination = next_hop;
        Ok(forwarded)
    }
}
