//! Message tags.
//!
//! A tag names the semantic kind of a message and selects its handler.
//! Application tags live in `[0, ROUTING_TAG_BASE)`; the runtime reserves
//! `[ROUTING_TAG_BASE, ROUTING_TAG_BASE * 2)` for the overlay router's
//! stamped/in-flight copy of an application tag, so the two ranges never
//! collide and the MPI-standard `TAG_UB >= 32767` constraint still holds.

use std::fmt;

/// First tag value reserved for routed (stamped) messages.
///
/// `2^14`. An application tag `t` in flight over the overlay is observed on
/// the wire as `t + ROUTING_TAG_BASE`.
pub const ROUTING_TAG_BASE: u32 = 16_384;

/// One past the highest tag value the MPI-standard `TAG_UB` guarantees.
pub const TAG_UB: u32 = 32_768;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct Tag(pub u32);

impl Tag {
    /// Is this tag value already in the routed range?
    pub fn is_routed(self) -> bool {
        self.0 >= ROUTING_TAG_BASE
    }

    /// Stamp an application tag with the routing offset.
    ///
    /// Idempotent by contract of the caller: the outbound stamping pass
    /// never calls this on a tag that `is_routed()` already.
    pub fn routed(self) -> Tag {
        debug_assert!(!self.is_routed(), "tag {} is already routed", self.0);
        Tag(self.0 + ROUTING_TAG_BASE)
    }

    /// Recover the original application tag from a routed tag.
    pub fn unrouted(self) -> Tag {
        debug_assert!(self.is_routed(), "tag {} is not routed", self.0);
        Tag(self.0 - ROUTING_TAG_BASE)
    }

    pub fn is_application_tag(self) -> bool {
        self.0 < ROUTING_TAG_BASE
    }
}

impl From<u32> for Tag {
    fn from(value: u32) -> Self {
        Tag(value)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_round_trip() {
        let t = Tag(5);
        let stamped = t.routed();
        assert_eq!(stamped, Tag(16_389));
        assert!(stamped.is_routed());
        assert_eq!(stamped.unrouted(), t);
    }

    #[test]
    fn application_range_is_below_base() {
        assert!(Tag(0).is_application_tag());
        assert!(Tag(ROUTING_TAG_BASE - 1).is_application_tag());
        assert!(!Tag(ROUTING_TAG_BASE).is_application_tag());
    }
}
