//! Bloom filter for SSTable key filtering.
//!
//! A Bloom filter answers "definitely absent" or "maybe present" for a key,
//! letting point lookups skip tables without reading a data block.

use bytes::{BufMut, Bytes, BytesMut};

/// Largest probe count accepted when decoding; larger values mean corruption.
const MAX_PROBES: u32 = 30;

/// Bloom filter decoded from a table's filter block.
///
/// The encoded form is the bit array followed by one byte holding the
/// probe count.
#[derive(Debug, Clone)]
pub struct BloomFilter {
    /// Encoded filter, probe count byte included.
    data: Bytes,
    /// Number of hash probes.
    k: u32,
}

impl BloomFilter {
    /// Decode a filter. Returns `None` for empty or implausible data.
    pub fn from_bytes(data: Bytes) -> Option<Self> {
        if data.len() < 2 {
            return None;
        }

        let k = data[data.len() - 1] as u32;
        if k == 0 || k > MAX_PROBES {
            return None;
        }

        Some(Self { data, k })
    }

    fn bits(&self) -> &[u8] {
        &self.data[..self.data.len() - 1]
    }

    /// Check if a key might be in the filter.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let bits = self.bits();
        let bits_len = bits.len() * 8;

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..self.k {
            let bit_pos = (h as usize) % bits_len;
            if bits[bit_pos / 8] & (1 << (bit_pos % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }

        true
    }

    /// Size of the encoded filter in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }
}

/// Accumulates key hashes and encodes a [`BloomFilter`].
pub struct BloomFilterBuilder {
    bits_per_key: usize,
    k: u32,
    /// Hashes of added keys.
    hashes: Vec<u32>,
}

impl BloomFilterBuilder {
    /// Create a builder. `bits_per_key == 0` produces no filter.
    pub fn new(bits_per_key: usize) -> Self {
        // k = bits_per_key * ln(2), clamped to [1, MAX_PROBES].
        let k = ((bits_per_key as f64 * 0.69) as u32).clamp(1, MAX_PROBES);

        Self {
            bits_per_key,
            k,
            hashes: Vec::new(),
        }
    }

    /// Add a key to the filter.
    pub fn add(&mut self, key: &[u8]) {
        self.hashes.push(bloom_hash(key));
    }

    /// Encode the filter. Empty when no keys were added or filtering is off.
    pub fn finish(&self) -> Bytes {
        if self.hashes.is_empty() || self.bits_per_key == 0 {
            return Bytes::new();
        }

        // Round up to whole bytes, with a 64-bit floor for tiny tables.
        let bits_count = (self.hashes.len() * self.bits_per_key).max(64);
        let bytes_count = (bits_count + 7) / 8;
        let bits_count = bytes_count * 8;

        let mut result = BytesMut::zeroed(bytes_count);
        for &hash in &self.hashes {
            let mut h = hash;
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bit_pos = (h as usize) % bits_count;
                result[bit_pos / 8] |= 1 << (bit_pos % 8);
                h = h.wrapping_add(delta);
            }
        }
        result.put_u8(self.k as u8);

        result.freeze()
    }
}

/// Hash function for Bloom filter, in the style of MurmurHash.
fn bloom_hash(key: &[u8]) -> u32 {
    const SEED: u32 = 0xbc9f1d34;
    const M: u32 = 0xc6a4a793;

    let mut h = SEED ^ (key.len() as u32).wrapping_mul(M);

    let mut chunks = key.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h = h.wrapping_add(w).wrapping_mul(M);
        h ^= h >> 16;
    }

    let rest = chunks.remainder();
    if rest.len() >= 3 {
        h = h.wrapping_add((rest[2] as u32) << 16);
    }
    if rest.len() >= 2 {
        h = h.wrapping_add((rest[1] as u32) << 8);
    }
    if !rest.is_empty() {
        h = h.wrapping_add(rest[0] as u32).wrapping_mul(M);
        h ^= h >> 24;
    }

    h
}
