//! Block format for SSTable data storage.
//!
//! A block contains a sequence of key-value entries with prefix compression,
//! followed by restart points for efficient binary search.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::util::coding::decode_varint64;
use crate::util::crc::block_checksum;
use crate::{Error, Result};

use super::{CompressionType, BLOCK_TRAILER_SIZE};

/// Handle to a block within an SSTable file.
///
/// Contains the offset and size needed to read the block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    /// Offset within the file.
    offset: u64,
    /// Size of the block, trailer included.
    size: u64,
}

impl BlockHandle {
    /// Create a new block handle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Get the offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Get the size.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Encode to buffer (fixed 16 bytes: offset + size as u64).
    pub fn encode_to(&self, buf: &mut BytesMut) {
        buf.put_u64_le(self.offset);
        buf.put_u64_le(self.size);
    }

    /// Decode from buffer.
    pub fn decode(data: &mut &[u8]) -> Result<Self> {
        if data.len() < Self::encoded_size() {
            return Err(Error::corruption("block handle too short"));
        }
        let offset = data.get_u64_le();
        let size = data.get_u64_le();
        Ok(Self { offset, size })
    }

    /// Encoded size in bytes.
    pub const fn encoded_size() -> usize {
        16
    }
}

/// A block of data from an SSTable.
///
/// Cloning is cheap: the contents are reference counted.
#[derive(Debug, Clone)]
pub struct Block {
    /// The raw block data.
    data: Bytes,
    /// Offset to the restart array.
    restart_offset: usize,
    /// Number of restart points.
    num_restarts: u32,
}

impl Block {
    /// Create a block from raw data.
    ///
    /// The data should include entries and restart points but NOT the trailer.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too short"));
        }

        let mut tail = &data[data.len() - 4..];
        let num_restarts = tail.get_u32_le();

        let restart_section_size = (num_restarts as usize)
            .checked_mul(4)
            .and_then(|size| size.checked_add(4))
            .filter(|&size| size <= data.len())
            .ok_or_else(|| Error::corruption("block too short for restart array"))?;

        let restart_offset = data.len() - restart_section_size;

        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Create a block from raw data carrying a trailer.
    ///
    /// The checksum is only checked when `verify_checksum` is set; the
    /// compression type is always honored.
    pub fn new_with_trailer(data: &[u8], verify_checksum: bool) -> Result<Self> {
        if data.len() < BLOCK_TRAILER_SIZE {
            return Err(Error::corruption("block too short for trailer"));
        }

        let content_len = data.len() - BLOCK_TRAILER_SIZE;
        let content = &data[..content_len];
        let mut trailer = &data[content_len..];

        let stored_crc = trailer.get_u32_le();
        let compression_type = trailer.get_u8();

        if verify_checksum && stored_crc != block_checksum(content, compression_type) {
            return Err(Error::corruption("block checksum mismatch"));
        }

        let block_data = match CompressionType::from_byte(compression_type) {
            Some(CompressionType::None) => Bytes::copy_from_slice(content),
            Some(CompressionType::Snappy) => {
                let decompressed = snap::raw::Decoder::new()
                    .decompress_vec(content)
                    .map_err(|e| Error::corruption(format!("snappy decompress failed: {}", e)))?;
                Bytes::from(decompressed)
            }
            Some(CompressionType::Lz4) => {
                let decompressed = lz4_flex::decompress_size_prepended(content)
                    .map_err(|e| Error::corruption(format!("lz4 decompress failed: {}", e)))?;
                Bytes::from(decompressed)
            }
            None => {
                return Err(Error::corruption("unknown compression type"));
            }
        };

        Self::new(block_data)
    }

    /// Get the raw data.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size of the decoded block in memory.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Get the number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Get a restart point offset.
    fn restart_point(&self, index: u32) -> usize {
        let offset = self.restart_offset + (index as usize * 4);
        let mut cursor = &self.data[offset..offset + 4];
        cursor.get_u32_le() as usize
    }

    /// Create an iterator over the block.
    pub fn iter(&self) -> BlockIterator {
        BlockIterator::new(self.clone())
    }

    /// Find the last restart point whose key is <= target.
    ///
    /// Returns 0 when every restart key is greater than the target.
    fn find_restart_point(&self, target: &[u8]) -> u32 {
        if self.num_restarts == 0 {
            return 0;
        }

        let mut left = 0u32;
        let mut right = self.num_restarts - 1;

        while left < right {
            let mid = (left + right + 1) / 2;
            match self.decode_key_at(self.restart_point(mid)) {
                Some(key) if key <= target => left = mid,
                Some(_) => right = mid - 1,
                None => break,
            }
        }

        left
    }

    /// Decode the key stored at a restart offset (no shared prefix).
    fn decode_key_at(&self, offset: usize) -> Option<&[u8]> {
        if offset >= self.restart_offset {
            return None;
        }
        let mut cursor = &self.data[offset..self.restart_offset];

        let shared = decode_varint64(&mut cursor)?;
        let unshared = decode_varint64(&mut cursor)? as usize;
        let _value_len = decode_varint64(&mut cursor)?;

        if shared != 0 || cursor.len() < unshared {
            return None;
        }

        Some(&cursor[..unshared])
    }
}

/// Iterator over entries in a block.
///
/// Supports forward and backward movement. Backward steps rescan from the
/// closest preceding restart point.
pub struct BlockIterator {
    /// The block being iterated.
    block: Block,
    /// Offset of the current entry.
    current: usize,
    /// Offset just past the current entry.
    next_offset: usize,
    /// Restart region that contains the current entry.
    restart_index: u32,
    /// Current key (accumulated with prefix compression).
    key: Vec<u8>,
    /// Current value, sliced out of the block.
    value: Bytes,
    /// Whether we're at a valid entry.
    valid: bool,
    /// Set when an entry failed to decode.
    corrupted: bool,
}

impl BlockIterator {
    fn new(block: Block) -> Self {
        let end = block.restart_offset;
        Self {
            block,
            current: end,
            next_offset: end,
            restart_index: 0,
            key: Vec::new(),
            value: Bytes::new(),
            valid: false,
            corrupted: false,
        }
    }

    /// Check if the iterator is valid.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Check whether a malformed entry stopped iteration.
    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Get the current key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// Get the current value.
    pub fn value(&self) -> &Bytes {
        &self.value
    }

    /// Move to the first entry.
    pub fn seek_to_first(&mut self) {
        self.seek_to_restart(0);
        self.parse_next_entry();
    }

    /// Move to the last entry.
    pub fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.invalidate();
            return;
        }
        self.seek_to_restart(self.block.num_restarts - 1);
        while self.parse_next_entry() && self.next_offset < self.block.restart_offset {}
    }

    /// Seek to the first entry with key >= target.
    pub fn seek(&mut self, target: &[u8]) {
        let restart_index = self.block.find_restart_point(target);
        self.seek_to_restart(restart_index);

        while self.parse_next_entry() {
            if self.key.as_slice() >= target {
                break;
            }
        }
    }

    /// Move to the next entry.
    pub fn next(&mut self) {
        if !self.valid {
            return;
        }
        self.parse_next_entry();
    }

    /// Move to the previous entry.
    pub fn prev(&mut self) {
        if !self.valid {
            return;
        }

        let original = self.current;
        let mut index = self.restart_index;
        while self.block.restart_point(index) >= original {
            if index == 0 {
                // Already at the first entry.
                self.invalidate();
                return;
            }
            index -= 1;
        }

        self.seek_to_restart(index);
        while self.parse_next_entry() && self.next_offset < original {}
    }

    fn seek_to_restart(&mut self, index: u32) {
        self.key.clear();
        self.restart_index = index;
        self.valid = false;
        self.next_offset = if self.block.num_restarts == 0 {
            self.block.restart_offset
        } else {
            self.block.restart_point(index)
        };
    }

    fn invalidate(&mut self) {
        self.current = self.block.restart_offset;
        self.next_offset = self.block.restart_offset;
        self.valid = false;
    }

    /// Parse the entry at `next_offset`, returning whether one was decoded.
    fn parse_next_entry(&mut self) -> bool {
        let end = self.block.restart_offset;
        if self.next_offset >= end {
            self.invalidate();
            return false;
        }

        let start = self.next_offset;
        let mut cursor = &self.block.data[start..end];
        let header = (|| {
            let shared = decode_varint64(&mut cursor)? as usize;
            let unshared = decode_varint64(&mut cursor)? as usize;
            let value_len = decode_varint64(&mut cursor)? as usize;
            Some((shared, unshared, value_len))
        })();

        let (shared, unshared, value_len) = match header {
            Some(h)
                if h.0 <= self.key.len()
                    && h.1.checked_add(h.2).map_or(false, |n| cursor.len() >= n) =>
            {
                h
            }
            _ => {
                self.corrupted = true;
                self.invalidate();
                return false;
            }
        };

        self.key.truncate(shared);
        self.key.extend_from_slice(&cursor[..unshared]);

        let value_start = end - cursor.len() + unshared;
        self.value = self.block.data.slice(value_start..value_start + value_len);

        self.current = start;
        self.next_offset = value_start + value_len;
        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) <= self.current
        {
            self.restart_index += 1;
        }
        self.valid = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::block_builder::BlockBuilder;
    use crate::util::coding::encode_varint64;

    fn build_block(count: usize, restart_interval: usize) -> Block {
        let mut builder = BlockBuilder::with_options(64 * 1024, restart_interval);
        for i in 0..count {
            let key = format!("key_{:03}", i);
            let value = format!("value_{}", i);
            builder.add(key.as_bytes(), value.as_bytes());
        }
        Block::new(builder.finish()).unwrap()
    }

    #[test]
    fn test_block_handle() {
        let handle = BlockHandle::new(100, 200);
        assert_eq!(handle.offset(), 100);
        assert_eq!(handle.size(), 200);

        let mut buf = BytesMut::new();
        handle.encode_to(&mut buf);
        assert_eq!(buf.len(), BlockHandle::encoded_size());

        let mut cursor = &buf[..];
        assert_eq!(BlockHandle::decode(&mut cursor).unwrap(), handle);
    }

    #[test]
    fn test_empty_block() {
        let mut data = BytesMut::new();
        data.put_u32_le(0); // num_restarts

        let block = Block::new(data.freeze()).unwrap();
        assert_eq!(block.num_restarts(), 0);

        let mut iter = block.iter();
        iter.seek_to_first();
        assert!(!iter.valid());
        iter.seek_to_last();
        assert!(!iter.valid());
        iter.seek(b"anything");
        assert!(!iter.valid());
    }

    #[test]
    fn test_entry_lengths_overflowing_are_corruption() {
        let mut data = BytesMut::new();
        encode_varint64(&mut data, 0);
        encode_varint64(&mut data, u64::MAX);
        encode_varint64(&mut data, 2);
        data.put_slice(b"kv");
        data.put_u32_le(0); // restart point
        data.put_u32_le(1); // num_restarts

        let block = Block::new(data.freeze()).unwrap();
        let mut iter = block.iter();
        iter.seek_to_first();
        assert!(!iter.valid());
        assert!(iter.is_corrupted());

        iter.seek(b"k");
        assert!(!iter.valid());
    }

    #[test]
    fn test_restart_count_larger_than_block() {
        let mut data = BytesMut::new();
        data.put_slice(b"abcd");
        data.put_u32_le(u32::MAX);
        assert!(Block::new(data.freeze()).unwrap_err().is_corruption());
    }

    #[test]
    fn test_block_too_short() {
        let data = Bytes::from_static(&[0, 1, 2]);
        assert!(Block::new(data).is_err());
    }

    #[test]
    fn test_block_forward_and_backward() {
        let block = build_block(20, 4);
        let mut iter = block.iter();

        let mut forward = Vec::new();
        iter.seek_to_first();
        while iter.valid() {
            forward.push(iter.key().to_vec());
            iter.next();
        }
        assert_eq!(forward.len(), 20);

        let mut backward = Vec::new();
        iter.seek_to_last();
        while iter.valid() {
            backward.push(iter.key().to_vec());
            iter.prev();
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_block_seek_then_prev() {
        let block = build_block(10, 3);
        let mut iter = block.iter();

        iter.seek(b"key_006");
        assert_eq!(iter.key(), b"key_006");
        assert_eq!(iter.value().as_ref(), b"value_6");

        iter.prev();
        assert_eq!(iter.key(), b"key_005");

        iter.seek(b"key_000");
        iter.prev();
        assert!(!iter.valid());
    }

    #[test]
    fn test_block_seek_before_first_restart_key() {
        let block = build_block(8, 2);
        let mut iter = block.iter();
        iter.seek(b"a");
        assert!(iter.valid());
        assert_eq!(iter.key(), b"key_000");
    }

    #[test]
    fn test_block_trailer_checksum() {
        let mut builder = BlockBuilder::new();
        builder.add(b"k1", b"v1");
        let data = builder.finish_with_trailer(CompressionType::None);

        let mut damaged = data.to_vec();
        damaged[0] ^= 0xff;

        assert!(Block::new_with_trailer(&damaged, true).is_err());
        // Without verification the damaged block still parses.
        assert!(Block::new_with_trailer(&damaged, false).is_ok());
    }
}
