//! Overlay connection graph (spec §3, `ConnectionGraph`).
//!
//! A directed graph over ranks exposing reachability and next-hop routing.
//! `RayPlatform::MessageRouter` calls this `ConnectionGraph` and builds one
//! of a handful of predefined topologies (complete, torus, hypercube-like)
//! parameterized by a `degree`; this module keeps the same split between
//! "the abstract graph a router routes over" and "a specific topology."

use crate::rank::Rank;

/// Reachability and next-hop routing over a fixed set of ranks.
pub trait ConnectionGraph: Send + Sync {
    /// Number of ranks in the pool this graph was built for.
    fn size(&self) -> usize;

    /// True if `v` is reachable from `u` in one hop.
    fn is_connected(&self, u: Rank, v: Rank) -> bool;

    /// Next hop toward `true_destination`, given the message currently sits
    /// at `self_rank`. Never returns `self_rank`.
    ///
    /// Implementations must guarantee that repeated application terminates
    /// at `true_destination` in a number of steps bounded by the graph's
    /// diameter (spec §3 invariant).
    fn next_rank_in_route(&self, true_source: Rank, true_destination: Rank, self_rank: Rank) -> Rank;
}

/// Every rank directly connected to every other rank. No routing is ever
/// needed; `next_rank_in_route` is never called in practice when this graph
/// is in use, since the router only stamps messages between disconnected
/// pairs, but it is implemented correctly (one hop, direct) regardless.
pub struct CompleteGraph {
    size: usize,
}

impl CompleteGraph {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl ConnectionGraph for CompleteGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn is_connected(&self, u: Rank, v: Rank) -> bool {
        u != v && u.as_usize() < self.size && v.as_usize() < self.size
    }

    fn next_rank_in_route(&self, _true_source: Rank, true_destination: Rank, self_rank: Rank) -> Rank {
        debug_assert_ne!(true_destination, self_rank);
        true_destination
    }
}

/// A bidirectional ring: rank `i` is connected only to `i - 1` and `i + 1`
/// (mod `size`). Used in spec §8 scenario 1 ("ring of 4").
pub struct RingGraph {
    size: usize,
}

impl RingGraph {
    pub fn new(size: usize) -> Self {
        assert!(size >= 2, "a ring needs at least 2 ranks");
        Self { size }
    }

    fn next_clockwise(&self, r: Rank) -> Rank {
        Rank(((r.as_usize() + 1) % self.size) as u32)
    }

    fn next_counter_clockwise(&self, r: Rank) -> Rank {
        Rank(((r.as_usize() + self.size - 1) % self.size) as u32)
    }

    fn distance_clockwise(&self, from: Rank, to: Rank) -> usize {
        (to.as_usize() + self.size - from.as_usize()) % self.size
    }
}

impl ConnectionGraph for RingGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn is_connected(&self, u: Rank, v: Rank) -> bool {
        u != v && (self.next_clockwise(u) == v || self.next_counter_clockwise(u) == v)
    }

    fn next_rank_in_route(&self, _true_source: Rank, true_destination: Rank, self_rank: Rank) -> Rank {
        debug_assert_ne!(true_destination, self_rank);
        // Take whichever direction is shorter; ties go clockwise.
        let clockwise_distance = self.distance_clockwise(self_rank, true_destination);
        let counter_clockwise_distance = self.size - clockwise_distance;
        if clockwise_distance <= counter_clockwise_distance {
            self.next_clockwise(self_rank)
        } else {
            self.next_counter_clockwise(self_rank)
        }
    }
}

/// A hypercube-like topology: ranks are connected iff their indices differ
/// in exactly one bit of a `degree`-bit address space. `size` must be
/// `2^degree`. Routing flips one differing bit per hop (standard hypercube
/// dimension-order routing), which bounds route length by `degree`.
pub struct HypercubeGraph {
    size: usize,
    degree: u32,
}

impl HypercubeGraph {
    pub fn new(degree: u32) -> Self {
        let size = 1usize << degree;
        Self { size, degree }
    }
}

impl ConnectionGraph for HypercubeGraph {
    fn size(&self) -> usize {
        self.size
    }

    fn is_connected(&self, u: Rank, v: Rank) -> bool {
        u != v && (u.0 ^ v.0).count_ones() == 1
    }

    fn next_rank_in_route(&self, _true_source: Rank, true_destination: Rank, self_rank: Rank) -> Rank {
        let diff = self_rank.0 ^ true_destination.0;
        debug_assert_ne!(diff, 0);
        let bit = diff.trailing_zeros();
        debug_assert!(bit < self.degree);
        Rank(self_rank.0 ^ (1 << bit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_graph_is_fully_connected() {
        let g = CompleteGraph::new(4);
        for i in 0..4u32 {
            for j in 0..4u32 {
                if i != j {
                    assert!(g.is_connected(Rank(i), Rank(j)));
                }
            }
        }
    }

    #[test]
    fn ring_of_four_routes_rank0_to_rank2_via_rank1() {
        let g = RingGraph::new(4);
        assert!(!g.is_connected(Rank(0), Rank(2)));
        let hop = g.next_rank_in_route(Rank(0), Rank(2), Rank(1));
        assert_eq!(hop, Rank(2));
    }

    #[test]
    fn ring_routing_terminates_and_is_bounded_by_diameter() {
        let size = 8;
        let g = RingGraph::new(size);
        for src in 0..size as u32 {
            for dst in 0..size as u32 {
                if src == dst {
                    continue;
                }
                let mut current = Rank(src);
                let mut hops = 0;
                while current != Rank(dst) {
                    current = g.next_rank_in_route(Rank(src), Rank(dst), current);
                    hops += 1;
                    assert!(hops <= size / 2 + 1, "route did not terminate within the ring diameter");
                }
            }
        }
    }

    #[test]
    fn hypercube_routing_terminates_within_degree_hops() {
        let g = HypercubeGraph::new(3); // 8 ranks
        for src in 0..8u32 {
            for dst in 0..8u32 {
                if src == dst {
                    continue;
                }
                let mut current = Rank(src);
                let mut hops = 0;
                while current != Rank(dst) {
                    current = g.next_rank_in_route(Rank(src), Rank(dst), current);
                    hops += 1;
                    assert!(hops <= 3, "hypercube route exceeded its dimension count");
                }
            }
        }
    }
}
