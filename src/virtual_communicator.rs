//! Request batching for small, homogeneous worker queries (spec §4.7).
//!
//! Many plugin workers asking the same kind of question of the same
//! destination rank in the same tick get folded into one transport
//! message instead of one each, the way `VirtualCommunicator` batches
//! k-mer lookups across Ray's de Bruijn graph workers. Queries are kept in
//! per-`(tag, destination)` FIFO buckets and flushed in batches bounded by
//! [`MAX_PAYLOAD_BYTES`]; replies come back as one flat element array that
//! is demultiplexed back to each worker by position, in the same order the
//! queries were flushed.

use std::collections::{HashMap, VecDeque};

use crate::message::MAX_PAYLOAD_BYTES;
use crate::rank::Rank;
use crate::tag::Tag;

/// A caller-assigned identifier for one logical query, opaque to the
/// communicator. Plugins typically use a work-unit index here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(pub u32);

const ELEMENT_BYTES: usize = 8; // u64 elements, matching the original's key-value wire words.

struct PendingQuery {
    worker: WorkerId,
    elements: Vec<u64>,
}

/// Batches queries of one fixed shape: every push must carry exactly
/// `request_elements_per_query` elements, and every flush's reply carries
/// exactly `reply_elements_per_query` elements per worker served.
pub struct VirtualCommunicator {
    request_elements_per_query: usize,
    reply_elements_per_query: usize,
    buckets: HashMap<(Tag, Rank), VecDeque<PendingQuery>>,
    bucket_order: Vec<(Tag, Rank)>,
    cursor: usize,
    responses: HashMap<WorkerId, Vec<u64>>,
}

impl VirtualCommunicator {
    pub fn new(request_elements_per_query: usize, reply_elements_per_query: usize) -> Self {
        assert!(request_elements_per_query > 0, "a query must carry at least one element");
        Self {
            request_elements_per_query,
            reply_elements_per_query,
            buckets: HashMap::new(),
            bucket_order: Vec::new(),
            cursor: 0,
            responses: HashMap::new(),
        }
    }

    /// Maximum queries one flushed message can carry, given
    /// [`MAX_PAYLOAD_BYTES`] and this communicator's query shape.
    pub fn batch_capacity(&self) -> usize {
        (MAX_PAYLOAD_BYTES / ELEMENT_BYTES / self.request_elements_per_query).max(1)
    }

    /// Enqueue one worker's query, to be sent to `destination` under `tag`.
    ///
    /// Panics if `elements.len() != request_elements_per_query`: this is a
    /// caller-side shape bug, not a runtime condition, so it is asserted
    /// rather than threaded through a `Result`.
    pub fn push_query(&mut self, tag: Tag, destination: Rank, worker: WorkerId, elements: Vec<u64>) {
        assert_eq!(elements.len(), self.request_elements_per_query, "query shape mismatch");
        let key = (tag, destination);
        if !self.buckets.contains_key(&key) {
            self.bucket_order.push(key);
        }
        self.buckets.entry(key).or_default().push_back(PendingQuery { worker, elements });
    }

    /// Pop up to [`VirtualCommunicator::batch_capacity`] queries from the
    /// `(tag, destination)` bucket, in FIFO order. Returns `None` if the
    /// bucket is empty. The returned worker-id order is the order replies
    /// must be supplied back in via [`VirtualCommunicator::record_reply`].
    pub fn flush(&mut self, tag: Tag, destination: Rank) -> Option<(Vec<WorkerId>, Vec<u64>)> {
        let bucket = self.buckets.get_mut(&(tag, destination))?;
        if bucket.is_empty() {
            return None;
        }
        let capacity = self.batch_capacity();
        let mut workers = Vec::new();
        let mut flattened = Vec::new();
        while workers.len() < capacity {
            match bucket.pop_front() {
                Some(query) => {
                    workers.push(query.worker);
                    flattened.extend(query.elements);
                }
                None => break,
            }
        }
        Some((workers, flattened))
    }

    /// Flush one batch from each bucket that has pending work, advancing a
    /// round-robin cursor so no single destination can starve the others
    /// by always having the most queued work (spec §4.7 fairness).
    pub fn flush_round(&mut self) -> Vec<(Tag, Rank, Vec<WorkerId>, Vec<u64>)> {
        self.bucket_order.retain(|key| self.buckets.get(key).is_some_and(|b| !b.is_empty()));
        let n = self.bucket_order.len();
        let mut out = Vec::new();
        for i in 0..n {
            let index = (self.cursor + i) % n;
            let key = self.bucket_order[index];
            if let Some((workers, elements)) = self.flush(key.0, key.1) {
                out.push((key.0, key.1, workers, elements));
            }
        }
        if n > 0 {
            self.cursor = (self.cursor + 1) % n;
        }
        out
    }

    /// Record a batched reply, splitting `flattened` into
    /// `reply_elements_per_query`-sized chunks and assigning them back to
    /// `workers` by position — the same order [`VirtualCommunicator::flush`]
    /// returned them in.
    pub fn record_reply(&mut self, workers: &[WorkerId], flattened: Vec<u64>) {
        debug_assert_eq!(flattened.len(), workers.len() * self.reply_elements_per_query);
        for (i, worker) in workers.iter().enumerate() {
            let start = i * self.reply_elements_per_query;
            let end = start + self.reply_elements_per_query;
            self.responses.insert(*worker, flattened[start..end].to_vec());
        }
    }

    pub fn is_message_processed(&self, worker: WorkerId) -> bool {
        self.responses.contains_key(&worker)
    }

    /// Takes the reply so a second call for the same worker returns `None`
    /// — a worker's answer is consumed exactly once.
    pub fn take_message_response_elements(&mut self, worker: WorkerId) -> Option<Vec<u64>> {
        self.responses.remove(&worker)
    }
}
