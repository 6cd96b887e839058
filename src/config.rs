//! Engine configuration and its validation (ambient stack, SPEC_FULL.md §5).
//!
//! `EngineConfig` is checked once, at [`crate::engine::Engine::new`] time,
//! rather than at each site that reads one of its fields — an engine either
//! starts with a configuration that is internally consistent or it does not
//! start at all.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::message::{HEADER_BYTES, MAX_PAYLOAD_BYTES};
use crate::router::DEFAULT_DRAIN_WINDOW;

/// Which [`crate::graph::ConnectionGraph`] the overlay router is built
/// over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Topology {
    Complete,
    Ring,
    Hypercube { degree: u32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Number of ranks in the pool.
    pub pool_size: usize,
    /// Connection graph the overlay router routes over.
    pub topology: Topology,
    /// Ring allocator slots available per tick.
    pub ring_capacity: usize,
    /// Bytes per ring allocator slot; must be large enough for the worst
    /// case encoded message.
    pub ring_slot_bytes: usize,
    /// Whether outbound messages carry a CRC32 trailer.
    pub crc_enabled: bool,
    /// How long the router keeps relaying in-flight overlay messages after
    /// `stop()` before the engine is allowed to exit.
    pub drain_window: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_size: 1,
            topology: Topology::Complete,
            ring_capacity: 64,
            ring_slot_bytes: MAX_PAYLOAD_BYTES + HEADER_BYTES,
            crc_enabled: true,
            drain_window: DEFAULT_DRAIN_WINDOW,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.pool_size == 0 {
            return Err(EngineError::Configuration("pool_size must be at least 1".into()));
        }
        if self.ring_capacity == 0 {
            return Err(EngineError::Configuration("ring_capacity must be at least 1".into()));
        }
        let minimum_slot_bytes = MAX_PAYLOAD_BYTES + HEADER_BYTES;
        if self.ring_slot_bytes < minimum_slot_bytes {
            return Err(EngineError::Configuration(format!(
                "ring_slot_bytes ({}) is smaller than MAX_PAYLOAD_BYTES + HEADER_BYTES ({minimum_slot_bytes})",
                self.ring_slot_bytes
            )));
        }
        if let Topology::Hypercube { degree } = self.topology {
            if self.pool_size != 1usize << degree {
                return Err(EngineError::Configuration(format!(
                    "hypercube topology of degree {degree} requires pool_size {}, got {}",
                    1usize << degree,
                    self.pool_size
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_pool_size_is_rejected() {
        let config = EngineConfig {
            pool_size: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn undersized_slots_are_rejected() {
        let config = EngineConfig {
            ring_slot_bytes: 10,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn hypercube_pool_size_must_match_degree() {
        let config = EngineConfig {
            pool_size: 5,
            topology: Topology::Hypercube { degree: 3 },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            pool_size: 8,
            topology: Topology::Hypercube { degree: 3 },
            ..EngineConfig::default()
        };
        assert!(config.validate().is_ok());
    }
}
