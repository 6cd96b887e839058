//! Rank identity.
//!
//! A rank is one member of the SPMD process pool, addressed by a small
//! non-negative integer in `[0, size)`. Rank 0 is always the master.

use std::fmt;

/// A process identity within the pool.
///
/// `Rank` wraps a plain `u32` rather than `usize` so that it can travel
/// unchanged through the wire metadata fields (§6), which are fixed 4-byte
/// little-endian integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Rank(pub u32);

/// Rank 0 is the designated master for the switch-manager phase program.
pub const MASTER_RANK: Rank = Rank(0);

impl Rank {
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }

    pub fn is_master(self) -> bool {
        self == MASTER_RANK
    }
}

impl From<u32> for Rank {
    fn from(value: u32) -> Self {
        Rank(value)
    }
}

impl From<usize> for Rank {
    fn from(value: usize) -> Self {
        Rank(value as u32)
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn master_rank_is_zero() {
        assert_eq!(MASTER_RANK, Rank(0));
        assert!(MASTER_RANK.is_master());
        assert!(!Rank(1).is_master());
    }

    #[test]
    fn conversions_round_trip() {
        let r: Rank = 7usize.into();
        assert_eq!(r.as_usize(), 7);
    }
}
