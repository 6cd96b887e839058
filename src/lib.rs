//! # rankmesh
//!
//! A cooperative, single-threaded SPMD message-passing runtime over a pool
//! of integer-addressed ranks. Each rank runs one [`engine::Engine`] tick
//! loop: receive whatever is waiting, route overlay-stamped traffic one hop
//! closer (or deliver it), dispatch to plugin/actor handlers, let the
//! current master/slave phase do its per-tick work, then encode and send
//! everything that step produced. No preemption, no rank-local
//! multithreading — concurrency comes from running one engine per pinned OS
//! thread, the way [`utils::spawn_with_affinity`] sets one up.

pub mod actor;
pub mod config;
pub mod crc32;
pub mod engine;
pub mod error;
pub mod graph;
pub mod logging;
pub mod message;
pub mod metrics;
pub mod rank;
pub mod registry;
pub mod ring_allocator;
pub mod router;
pub mod switch_man;
pub mod tag;
pub mod transport;
pub mod utils;
pub mod virtual_communicator;

pub use config::{EngineConfig, Topology};
pub use engine::Engine;
pub use error::EngineError;
pub use message::Message;
pub use rank::{Rank, MASTER_RANK};
pub use tag::Tag;

/// The current version of the crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
