//! Membership filter policies.
//!
//! A filter summarizes a set of keys so readers can skip blocks that
//! definitely do not contain a key. False positives are allowed; false
//! negatives are not.

use bytes::{BufMut, Bytes, BytesMut};

/// Policy that builds and queries membership filters over sets of keys.
pub trait FilterPolicy: Send + Sync {
    /// Name of this policy, recorded in the table's metaindex. A table must
    /// be read with a policy whose name matches the one it was built with.
    fn name(&self) -> &str;

    /// Build a filter summarizing `keys`.
    fn create_filter(&self, keys: &[Bytes]) -> Bytes;

    /// Check whether `key` may be in the set summarized by `filter`.
    ///
    /// Must return true for every key passed to the `create_filter` call that
    /// produced `filter`; may return true for other keys.
    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool;
}

/// Bloom filter policy.
///
/// Encodes a bit array sized at `bits_per_key` bits per key, with the probe
/// count appended as a trailing byte.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilterPolicy {
    bits_per_key: usize,
    /// Number of hash probes per key.
    k: u32,
}

impl BloomFilterPolicy {
    /// Create a bloom policy with the given bits per key (10 is a good
    /// default, giving a ~1% false positive rate).
    pub fn new(bits_per_key: usize) -> Self {
        // Optimal probe count is bits_per_key * ln(2), clamped to a sane range.
        let k = ((bits_per_key as f64 * 0.69) as u32).clamp(1, 30);
        Self { bits_per_key, k }
    }
}

impl FilterPolicy for BloomFilterPolicy {
    fn name(&self) -> &str {
        "rusttable.BloomFilter"
    }

    fn create_filter(&self, keys: &[Bytes]) -> Bytes {
        let mut bits_count = keys.len() * self.bits_per_key;
        // Small filters flip too many of their bits; enforce a floor.
        if bits_count < 64 {
            bits_count = 64;
        }
        let bytes_count = (bits_count + 7) / 8;
        let bits_count = bytes_count * 8;

        let mut bits = vec![0u8; bytes_count];
        for key in keys {
            // Double hashing: derive k probe positions from one hash.
            let mut h = bloom_hash(key);
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bit_pos = h as usize % bits_count;
                bits[bit_pos / 8] |= 1 << (bit_pos % 8);
                h = h.wrapping_add(delta);
            }
        }

        let mut result = BytesMut::with_capacity(bytes_count + 1);
        result.put_slice(&bits);
        result.put_u8(self.k as u8);
        result.freeze()
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }

        let bits = &filter[..filter.len() - 1];
        let bits_count = bits.len() * 8;

        let k = filter[filter.len() - 1] as u32;
        if k > 30 {
            // Reserved for future encodings; treat as a potential match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bit_pos = h as usize % bits_count;
            if bits[bit_pos / 8] & (1 << (bit_pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }

        true
    }
}

/// Hash function used for bloom probes: FNV-1a over 4-byte words with a
/// final avalanche so nearby keys land on unrelated bits.
fn bloom_hash(key: &[u8]) -> u32 {
    const FNV_OFFSET: u32 = 0x811c9dc5;
    const FNV_PRIME: u32 = 0x01000193;

    let mut h = FNV_OFFSET ^ (key.len() as u32);

    let mut words = key.chunks_exact(4);
    for word in &mut words {
        let w = u32::from_le_bytes(word.try_into().unwrap());
        h = (h ^ w).wrapping_mul(FNV_PRIME);
        h ^= h.rotate_right(13);
    }
    for &b in words.remainder() {
        h = (h ^ u32::from(b)).wrapping_mul(FNV_PRIME);
    }

    h ^= h >> 16;
    h = h.wrapping_mul(0x7feb352d);
    h ^= h >> 15;
    h
}
