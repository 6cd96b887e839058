//! Error categories for the runtime.
//!
//! Mirrors spec §7: configuration and routing errors are fatal and refuse
//! to start or keep running; resource exhaustion is fatal and indicates a
//! plugin bug; corruption is non-fatal and only drops the one message.
//! Unknown tags on ingress are deliberately *not* a variant here — the
//! engine logs and continues, it never returns an `Err` for them.

use crate::rank::Rank;
use crate::tag::Tag;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Unknown plugin, duplicate symbol, tag/mode out of range, or an
    /// internally inconsistent `EngineConfig`. Fatal: the engine refuses to
    /// start.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The ring allocator or the outbox received more allocations in one
    /// tick than its fixed capacity allows. Fatal: indicates a handler that
    /// is enqueuing more outbound messages per tick than the engine was
    /// sized for.
    #[error("resource exhausted for tag {tag}: {count} allocations exceed capacity {capacity}")]
    ResourceExhausted {
        tag: Tag,
        count: usize,
        capacity: usize,
    },

    /// `getNextRankInRoute` returned a rank outside `[0, size)`, or the
    /// destination is unreachable in the configured connection graph.
    /// Fatal: indicates an inconsistent routing graph.
    #[error("routing error: {0}")]
    Routing(String),

    /// A symbol registered by one plugin was never resolved by another
    /// during `resolve_symbols`. Fatal at boot.
    #[error("unresolved symbol: {0}")]
    UnresolvedSymbol(String),

    /// CRC32 mismatch on decode. Surfaced as an `Err` from [`crate::message::decode`]
    /// purely so the call returns a `Result` like everything else in that
    /// module; the engine's tick loop is the only place that ever sees this
    /// variant, and it treats it as non-fatal — log at `warn`, record it in
    /// `EngineMetrics`, drop the message, keep ticking.
    #[error("corrupted message from {source} on tag {tag}")]
    Corruption { source: Rank, tag: Tag },
}
