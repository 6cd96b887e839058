//! The message envelope and its wire encoding.
//!
//! A [`Message`] is produced and consumed entirely in terms of Rust values;
//! [`encode`] and [`decode`] are the only functions that know about the
//! actual byte layout described in spec §6. Metadata is written into the
//! tail of the slot in the reverse order it needs to be read back: the
//! payload comes first, then the optional variable-length fields
//! (mini-rank, actor, routing — innermost to outermost), then alignment
//! padding, then two always-present trailer words (payload length and a
//! presence-flags bitmask), then an optional CRC32. The flags/length pair
//! sits at a fixed offset from the end of the slot regardless of how much
//! padding precedes it, so a receiver can locate every optional field by
//! direct offset instead of having to guess where padding ends.

use crate::error::EngineError;
use crate::rank::Rank;
use crate::tag::Tag;

/// Largest application payload this runtime will carry in one message.
pub const MAX_PAYLOAD_BYTES: usize = 4_000;

/// Worst-case bytes reserved for metadata + flags + alignment padding + CRC,
/// beyond the payload itself. Every ring allocator slot must be at least
/// `MAX_PAYLOAD_BYTES + HEADER_BYTES` (spec §3 invariant).
pub const HEADER_BYTES: usize = 40;

const FLAG_MINI_RANK: u32 = 0b001;
const FLAG_ACTOR: u32 = 0b010;
const FLAG_ROUTING: u32 = 0b100;

/// True source/destination recorded by the overlay router while a message
/// is in flight with a stamped (`tag + ROUTING_TAG_BASE`) transport tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingStamp {
    pub true_source: Rank,
    pub true_destination: Rank,
}

/// Actor addressing, present when a message targets an actor rather than a
/// plain tag handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorStamp {
    pub source_actor: u32,
    pub destination_actor: u32,
}

/// Legacy mini-rank multiplexing identifiers. The mini-rank adapter itself
/// is out of scope (spec §9 Open Questions permits deferring it entirely);
/// the field is retained here purely so the wire layout can carry it
/// without a breaking change if that adapter is added later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MiniRankStamp {
    pub source: u32,
    pub destination: u32,
}

/// One message in transit between ranks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub source: Rank,
    pub destination: Rank,
    pub tag: Tag,
    pub payload: Vec<u8>,
    pub routing: Option<RoutingStamp>,
    pub actor: Option<ActorStamp>,
    pub mini_rank: Option<MiniRankStamp>,
}

impl Message {
    pub fn new(source: Rank, destination: Rank, tag: Tag, payload: Vec<u8>) -> Self {
        Self {
            source,
            destination,
            tag,
            payload,
            routing: None,
            actor: None,
            mini_rank: None,
        }
    }

    /// Is this message addressed to an actor rather than a plain tag handler?
    pub fn is_actor_message(&self) -> bool {
        self.actor.is_some()
    }

    /// Bytes of metadata this message occupies beyond its payload, not
    /// counting CRC or alignment padding. Mirrors
    /// `RayPlatform::Message::getMetaDataSize`.
    pub fn metadata_len(&self) -> usize {
        let mut n = 8; // payload-length + flags trailer words, always present
        if self.mini_rank.is_some() {
            n += 8;
        }
        if self.actor.is_some() {
            n += 8;
        }
        if self.routing.is_some() {
            n += 8;
        }
        n
    }

    fn flags(&self) -> u32 {
        let mut f = 0;
        if self.mini_rank.is_some() {
            f |= FLAG_MINI_RANK;
        }
        if self.actor.is_some() {
            f |= FLAG_ACTOR;
        }
        if self.routing.is_some() {
            f |= FLAG_ROUTING;
        }
        f
    }
}

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) / align * align
}

/// Serialize `message` into `slot`, optionally appending a CRC32 trailer.
///
/// Returns the number of bytes written, which is always
/// `<= MAX_PAYLOAD_BYTES + HEADER_BYTES`.
pub fn encode(message: &Message, slot: &mut [u8], crc_enabled: bool) -> Result<usize, EngineError> {
    if message.payload.len() > MAX_PAYLOAD_BYTES {
        return Err(EngineError::Configuration(format!(
            "payload of {} bytes exceeds MAX_PAYLOAD_BYTES ({})",
            message.payload.len(),
            MAX_PAYLOAD_BYTES
        )));
    }
    if slot.len() < MAX_PAYLOAD_BYTES + HEADER_BYTES {
        return Err(EngineError::Configuration(format!(
            "slot of {} bytes is smaller than MAX_PAYLOAD_BYTES + HEADER_BYTES ({})",
            slot.len(),
            MAX_PAYLOAD_BYTES + HEADER_BYTES
        )));
    }

    let payload_len = message.payload.len();
    let mut cursor = payload_len;
    slot[..cursor].copy_from_slice(&message.payload);

    // innermost first: mini-rank, then actor, then routing.
    if let Some(mini_rank) = message.mini_rank {
        write_u32(slot, &mut cursor, mini_rank.source);
        write_u32(slot, &mut cursor, mini_rank.destination);
    }
    if let Some(actor) = message.actor {
        write_u32(slot, &mut cursor, actor.source_actor);
        write_u32(slot, &mut cursor, actor.destination_actor);
    }
    if let Some(routing) = message.routing {
        write_u32(slot, &mut cursor, routing.true_source.0);
        write_u32(slot, &mut cursor, routing.true_destination.0);
    }

    // Pad so the always-present trailer (payload length + flags, 8 bytes)
    // ends on an 8-byte boundary.
    let aligned = align_up(cursor + 8, 8);
    let pad = aligned - 8 - cursor;
    for _ in 0..pad {
        slot[cursor] = 0;
        cursor += 1;
    }

    write_u32(slot, &mut cursor, payload_len as u32);
    write_u32(slot, &mut cursor, message.flags());
    debug_assert_eq!(cursor % 8, 0, "header must be 8-byte aligned");

    if crc_enabled {
        let crc = crate::crc32::checksum(&slot[..cursor]);
        write_u32(slot, &mut cursor, crc);
    }

    Ok(cursor)
}

/// Inverse of [`encode`]. `len` is the number of meaningful bytes at the
/// front of `slot` (as reported by the transport); `source`/`destination`/
/// `tag` are the transport-level envelope fields the caller already knows
/// (they travel alongside the slot, not inside it).
pub fn decode(
    slot: &[u8],
    len: usize,
    source: Rank,
    destination: Rank,
    tag: Tag,
    crc_enabled: bool,
) -> Result<Message, EngineError> {
    let mut end = len;

    if crc_enabled {
        if end < 4 {
            return Err(EngineError::Configuration("message too short for CRC32 trailer".into()));
        }
        end -= 4;
        let expected = read_u32(slot, end);
        let actual = crate::crc32::checksum(&slot[..end]);
        if actual != expected {
            return Err(EngineError::Corruption { source, tag });
        }
    }

    if end < 8 {
        return Err(EngineError::Configuration("message too short for trailer".into()));
    }
    let flags = read_u32(slot, end - 4);
    let payload_len = read_u32(slot, end - 8) as usize;

    if payload_len > MAX_PAYLOAD_BYTES || payload_len > end {
        return Err(EngineError::Configuration(format!(
            "decoded payload length {} is not plausible",
            payload_len
        )));
    }

    let mut offset = payload_len;
    let mini_rank = if flags & FLAG_MINI_RANK != 0 {
        let stamp = MiniRankStamp {
            source: read_u32(slot, offset),
            destination: read_u32(slot, offset + 4),
        };
        offset += 8;
        Some(stamp)
    } else {
        None
    };
    let actor = if flags & FLAG_ACTOR != 0 {
        let stamp = ActorStamp {
            source_actor: read_u32(slot, offset),
            destination_actor: read_u32(slot, offset + 4),
        };
        offset += 8;
        Some(stamp)
    } else {
        None
    };
    let routing = if flags & FLAG_ROUTING != 0 {
        let stamp = RoutingStamp {
            true_source: Rank(read_u32(slot, offset)),
            true_destination: Rank(read_u32(slot, offset + 4)),
        };
        offset += 8;
        Some(stamp)
    } else {
        None
    };
    let _ = offset; // remainder up to `end - 8` is alignment padding.

    Ok(Message {
        source,
        destination,
        tag,
        payload: slot[..payload_len].to_vec(),
        routing,
        actor,
        mini_rank,
    })
}

fn write_u32(slot: &mut [u8], cursor: &mut usize, value: u32) {
    slot[*cursor..*cursor + 4].copy_from_slice(&value.to_le_bytes());
    *cursor += 4;
}

fn read_u32(slot: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&slot[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot() -> Vec<u8> {
        vec![0u8; MAX_PAYLOAD_BYTES + HEADER_BYTES]
    }

    #[test]
    fn plain_message_round_trips() {
        let msg = Message::new(Rank(0), Rank(1), Tag(5), vec![0xAB, 0xCD, 0xEF]);
        let mut buf = slot();
        let len = encode(&msg, &mut buf, false).unwrap();
        let decoded = decode(&buf, len, Rank(0), Rank(1), Tag(5), false).unwrap();
        assert_eq!(decoded.payload, msg.payload);
        assert!(decoded.routing.is_none());
        assert!(decoded.actor.is_none());
    }

    #[test]
    fn empty_payload_round_trips() {
        let msg = Message::new(Rank(0), Rank(1), Tag(5), vec![]);
        let mut buf = slot();
        let len = encode(&msg, &mut buf, true).unwrap();
        let decoded = decode(&buf, len, Rank(0), Rank(1), Tag(5), true).unwrap();
        assert!(decoded.payload.is_empty());
    }

    #[test]
    fn routed_message_round_trips_with_crc() {
        let mut msg = Message::new(Rank(0), Rank(2), Tag(5).routed(), vec![1, 2, 3, 4]);
        msg.routing = Some(RoutingStamp {
            true_source: Rank(0),
            true_destination: Rank(2),
        });
        let mut buf = slot();
        let len = encode(&msg, &mut buf, true).unwrap();
        let decoded = decode(&buf, len, Rank(0), Rank(1), Tag(5).routed(), true).unwrap();
        assert_eq!(decoded.routing, msg.routing);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn actor_and_routing_coexist() {
        let mut msg = Message::new(Rank(0), Rank(2), Tag(5).routed(), vec![7; 10]);
        msg.routing = Some(RoutingStamp {
            true_source: Rank(0),
            true_destination: Rank(2),
        });
        msg.actor = Some(ActorStamp {
            source_actor: 3,
            destination_actor: 9,
        });
        let mut buf = slot();
        let len = encode(&msg, &mut buf, false).unwrap();
        let decoded = decode(&buf, len, Rank(0), Rank(1), Tag(5).routed(), false).unwrap();
        assert_eq!(decoded.routing, msg.routing);
        assert_eq!(decoded.actor, msg.actor);
        assert_eq!(decoded.payload, msg.payload);
    }

    #[test]
    fn crc_mismatch_reports_corruption() {
        let msg = Message::new(Rank(0), Rank(1), Tag(9), vec![9; 16]);
        let mut buf = slot();
        let len = encode(&msg, &mut buf, true).unwrap();
        buf[0] ^= 0xFF; // flip a payload bit
        let result = decode(&buf, len, Rank(0), Rank(1), Tag(9), true);
        assert!(matches!(result, Err(EngineError::Corruption { .. })));
    }

    #[test]
    fn oversized_payload_is_a_configuration_error() {
        let msg = Message::new(Rank(0), Rank(1), Tag(0), vec![0u8; MAX_PAYLOAD_BYTES + 1]);
        let mut buf = slot();
        let result = encode(&msg, &mut buf, false);
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }
}
