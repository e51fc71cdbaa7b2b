//! Block builder for constructing SSTable blocks.
//!
//! Builds blocks with prefix compression and restart points. The same
//! builder produces data, index and properties blocks.

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::encode_varint64;
use crate::util::crc::block_checksum;

use super::{CompressionType, BLOCK_TRAILER_SIZE, DEFAULT_BLOCK_SIZE};

/// Default number of entries between restart points.
const DEFAULT_RESTART_INTERVAL: usize = 16;

/// Builder for SSTable blocks.
///
/// Uses prefix compression to reduce key storage overhead,
/// with restart points for efficient binary search.
pub struct BlockBuilder {
    /// Buffer for block data.
    buffer: BytesMut,
    /// Restart point offsets.
    restarts: Vec<u32>,
    /// Number of entries since last restart.
    counter: usize,
    /// Restart interval.
    restart_interval: usize,
    /// Last key added (for prefix compression).
    last_key: Vec<u8>,
    /// Number of entries added since the last reset.
    num_entries: usize,
    /// Whether `finish` has been called.
    finished: bool,
    /// Target block size.
    block_size: usize,
}

impl BlockBuilder {
    /// Create a new block builder with default settings.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BLOCK_SIZE, DEFAULT_RESTART_INTERVAL)
    }

    /// Create a new block builder with custom options.
    pub fn with_options(block_size: usize, restart_interval: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(block_size),
            restarts: vec![0],
            counter: 0,
            restart_interval: restart_interval.max(1),
            last_key: Vec::new(),
            num_entries: 0,
            finished: false,
            block_size,
        }
    }

    /// Add a key-value pair to the block.
    ///
    /// Keys must be added in sorted order.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);
        debug_assert!(
            self.num_entries == 0 || key > self.last_key.as_slice(),
            "keys must be added in sorted order"
        );

        let shared = if self.counter < self.restart_interval {
            self.last_key
                .iter()
                .zip(key.iter())
                .take_while(|(a, b)| a == b)
                .count()
        } else {
            // Start a new restart point - no prefix compression
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let unshared = key.len() - shared;

        // Encode entry: shared_len | unshared_len | value_len | key_delta | value
        encode_varint64(&mut self.buffer, shared as u64);
        encode_varint64(&mut self.buffer, unshared as u64);
        encode_varint64(&mut self.buffer, value.len() as u64);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
        self.num_entries += 1;
    }

    /// Check if the block is empty.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Get the current estimated size of the block.
    pub fn current_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4 + BLOCK_TRAILER_SIZE
    }

    /// Check if adding more entries would exceed the target size.
    pub fn should_flush(&self) -> bool {
        self.current_size() >= self.block_size
    }

    /// Finish building the block and return the data.
    ///
    /// Returns the block contents without trailer.
    pub fn finish(&mut self) -> Bytes {
        debug_assert!(!self.finished);
        self.finished = true;

        for &restart in &self.restarts {
            self.buffer.put_u32_le(restart);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);

        self.buffer.clone().freeze()
    }

    /// Finish and add trailer with CRC and compression type.
    ///
    /// Falls back to no compression when compressing does not shrink the block.
    pub fn finish_with_trailer(&mut self, compression: CompressionType) -> Bytes {
        let content = self.finish();

        let (final_content, final_compression) = match compression {
            CompressionType::None => (content, CompressionType::None),
            CompressionType::Snappy => match snap::raw::Encoder::new().compress_vec(&content) {
                Ok(compressed) if compressed.len() < content.len() => {
                    (Bytes::from(compressed), CompressionType::Snappy)
                }
                _ => (content, CompressionType::None),
            },
            CompressionType::Lz4 => {
                let compressed = lz4_flex::compress_prepend_size(&content);
                if compressed.len() < content.len() {
                    (Bytes::from(compressed), CompressionType::Lz4)
                } else {
                    (content, CompressionType::None)
                }
            }
        };

        let mut result = BytesMut::with_capacity(final_content.len() + BLOCK_TRAILER_SIZE);
        result.put_slice(&final_content);
        result.put_u32_le(block_checksum(&final_content, final_compression.to_byte()));
        result.put_u8(final_compression.to_byte());

        result.freeze()
    }

    /// Reset the builder for reuse.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.num_entries = 0;
        self.finished = false;
    }
}

impl Default for BlockBuilder {
    fn default() -> Self {
        Self::new()
    }
}
