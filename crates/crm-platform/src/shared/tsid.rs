//! TSID Generator
//!
//! Time-sorted 64-bit ids rendered as 13 Crockford Base32 characters, used
//! as `_id` for every document.

use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Crockford Base32 alphabet (excludes I, L, O, U)
const ALPHABET: &[u8; 32] = b"0123456789ABCDEFGHJKMNPQRSTVWXYZ";

static COUNTER: AtomicU16 = AtomicU16::new(0);

pub struct TsidGenerator;

impl TsidGenerator {
    /// Generate a new TSID, e.g. "0HZXEQ5Y8JY5Z"
    ///
    /// Layout: 42 bits of milliseconds since epoch, 10 bits of noise,
    /// 12 bits of a process-wide counter.
    pub fn generate() -> String {
        let now = unix_nanos();
        let millis = (now / 1_000_000) as u64;

        let counter = COUNTER.fetch_add(1, Ordering::SeqCst) as u64;
        let noise = ((now as u64) ^ counter.wrapping_mul(0x5851F42D4C957F2D)) & 0x3FF;

        let tsid = ((millis & 0x3FF_FFFF_FFFF) << 22) | (noise << 12) | (counter & 0xFFF);
        encode_crockford(tsid)
    }
}

fn unix_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

fn encode_crockford(mut value: u64) -> String {
    let mut result = [b'0'; 13];

    for slot in result.iter_mut().rev() {
        *slot = ALPHABET[(value & 0x1F) as usize];
        value >>= 5;
    }

    result.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_tsid() {
        let id = TsidGenerator::generate();
        assert_eq!(id.len(), 13);
        assert!(id.bytes().all(|b| ALPHABET.contains(&b)));
    }

    #[test]
    fn test_uniqueness() {
        let mut ids = std::collections::HashSet::new();
        for _ in 0..1000 {
            assert!(ids.insert(TsidGenerator::generate()), "Duplicate TSID generated");
        }
    }

    #[test]
    fn test_sortability() {
        let id1 = TsidGenerator::generate();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = TsidGenerator::generate();
        assert!(id1 < id2, "TSIDs should be lexicographically sortable");
    }

}
