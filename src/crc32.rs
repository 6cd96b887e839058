//! CRC32 integrity check (spec §4.8).
//!
//! The standard IEEE 802.3 reflected polynomial, `0xEDB88320`. This guards
//! against corruption in transit; it is not authentication, and this
//! runtime makes no claim otherwise (spec §1 Non-goals: "no encryption").

const POLYNOMIAL: u32 = 0xEDB8_8320;

fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ POLYNOMIAL
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Compute the CRC32 of `bytes`.
pub fn checksum(bytes: &[u8]) -> u32 {
    // A 256-entry table computed once per process and shared across all
    // ranks' allocators; recomputing it is cheap enough that a lazily
    // built static avoids pulling in an extra crate for one small table.
    use std::sync::OnceLock;
    static TABLE: OnceLock<[u32; 256]> = OnceLock::new();
    let table = TABLE.get_or_init(build_table);

    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in bytes {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = (crc >> 8) ^ table[index];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // CRC-32/ISO-HDLC of the ASCII string "123456789" is 0xCBF43926,
        // the standard check value for this polynomial.
        assert_eq!(checksum(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn single_bit_flip_changes_the_checksum() {
        let original = b"the quick brown fox".to_vec();
        let base = checksum(&original);
        for i in 0..original.len() {
            for bit in 0..8u8 {
                let mut flipped = original.clone();
                flipped[i] ^= 1 << bit;
                assert_ne!(checksum(&flipped), base, "bit flip at byte {i} bit {bit} went undetected");
            }
        }
    }

    #[test]
    fn empty_input_is_zero() {
        assert_eq!(checksum(&[]), 0);
    }
}
