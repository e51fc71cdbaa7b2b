//! SSTable writer for building immutable sorted files.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use crate::util::crc::block_checksum;
use crate::{Error, Result};

use super::block_builder::BlockBuilder;
use super::filter::BloomFilterBuilder;
use super::properties::{TableProperties, RESERVED_PROPERTY_PREFIX};
use super::{
    BlockHandle, CompressionType, Footer, BLOCK_TRAILER_SIZE, DEFAULT_BLOCK_SIZE, FOOTER_SIZE,
};

/// Writer for building SSTable files.
///
/// Writes key-value pairs in sorted order, building data blocks,
/// a Bloom filter, an index and a properties block.
pub struct SSTableWriter {
    /// Buffered file writer.
    writer: BufWriter<File>,
    /// Current offset in the file.
    offset: u64,
    /// Block builder for data blocks.
    data_block: BlockBuilder,
    /// Index block builder.
    index_block: BlockBuilder,
    /// Bloom filter builder.
    filter_builder: BloomFilterBuilder,
    /// Last key written (for index).
    last_key: Vec<u8>,
    /// Pending index entry (written after data block is flushed).
    pending_index_entry: Option<BlockHandle>,
    /// Compression type.
    compression: CompressionType,
    /// File number.
    file_number: u64,
    /// Properties accumulated so far.
    properties: TableProperties,
}

impl SSTableWriter {
    /// Create a new SSTable writer.
    pub fn new(
        path: &Path,
        file_number: u64,
        compression: CompressionType,
        bits_per_key: usize,
    ) -> Result<Self> {
        Self::with_block_size(path, file_number, compression, bits_per_key, DEFAULT_BLOCK_SIZE)
    }

    /// Create a new SSTable writer with custom block size.
    pub fn with_block_size(
        path: &Path,
        file_number: u64,
        compression: CompressionType,
        bits_per_key: usize,
        block_size: usize,
    ) -> Result<Self> {
        let file = File::create(path)?;

        Ok(Self {
            writer: BufWriter::with_capacity(block_size * 4, file),
            offset: 0,
            data_block: BlockBuilder::with_options(block_size, 16),
            index_block: BlockBuilder::with_options(block_size, 1),
            filter_builder: BloomFilterBuilder::new(bits_per_key),
            last_key: Vec::new(),
            pending_index_entry: None,
            compression,
            file_number,
            properties: TableProperties {
                compression,
                ..TableProperties::default()
            },
        })
    }

    /// Get the file number.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Get the number of entries written.
    pub fn entry_count(&self) -> u64 {
        self.properties.num_entries
    }

    /// Properties accumulated so far.
    pub fn properties(&self) -> &TableProperties {
        &self.properties
    }

    /// Attach a user property, stored verbatim in the properties block.
    ///
    /// Names under the reserved `sst.` prefix are rejected. Setting a name
    /// twice keeps the last value.
    pub fn add_user_property(&mut self, name: &str, value: impl Into<Bytes>) -> Result<()> {
        if name.starts_with(RESERVED_PROPERTY_PREFIX) {
            return Err(Error::InvalidArgument(format!(
                "property name {:?} uses the reserved prefix {:?}",
                name, RESERVED_PROPERTY_PREFIX
            )));
        }
        self.properties
            .user_collected
            .insert(name.to_string(), value.into());
        Ok(())
    }

    /// Add a key-value pair.
    ///
    /// Keys must be strictly increasing.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.properties.num_entries > 0 && key <= self.last_key.as_slice() {
            return Err(Error::InvalidArgument(format!(
                "table {:06}: keys must be added in strictly increasing order",
                self.file_number
            )));
        }

        // Write pending index entry for previous block
        if let Some(handle) = self.pending_index_entry.take() {
            let separator = find_short_separator(&self.last_key, key);
            self.write_index_entry(&separator, handle);
        }

        let props = &mut self.properties;
        if props.num_entries == 0 {
            props.smallest_key = Bytes::copy_from_slice(key);
        }
        props.num_entries += 1;
        props.raw_key_size += key.len() as u64;
        props.raw_value_size += value.len() as u64;

        self.filter_builder.add(key);
        self.data_block.add(key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);

        if self.data_block.should_flush() {
            self.flush_data_block()?;
        }

        Ok(())
    }

    /// Flush the current data block to disk.
    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }

        let block_data = self.data_block.finish_with_trailer(self.compression);
        let handle = self.write_raw_block(&block_data)?;
        self.properties.data_size += handle.size();
        self.properties.num_data_blocks += 1;

        // Index entry waits until the next block's first key is known
        self.pending_index_entry = Some(handle);

        self.data_block.reset();
        Ok(())
    }

    /// Write a raw block to the file.
    fn write_raw_block(&mut self, data: &[u8]) -> Result<BlockHandle> {
        let handle = BlockHandle::new(self.offset, data.len() as u64);
        self.writer.write_all(data)?;
        self.offset += data.len() as u64;
        Ok(handle)
    }

    /// Write an index entry.
    fn write_index_entry(&mut self, key: &[u8], handle: BlockHandle) {
        let mut value = BytesMut::with_capacity(16);
        handle.encode_to(&mut value);
        self.index_block.add(key, &value);
    }

    /// Finish writing the SSTable.
    ///
    /// Writes the filter, index and properties blocks followed by the footer.
    pub fn finish(mut self) -> Result<SSTableInfo> {
        self.flush_data_block()?;

        if let Some(handle) = self.pending_index_entry.take() {
            let successor = find_short_successor(&self.last_key);
            self.write_index_entry(&successor, handle);
        }
        if self.properties.num_entries > 0 {
            self.properties.largest_key = Bytes::copy_from_slice(&self.last_key);
        }

        let filter_data = self.filter_builder.finish();
        let filter_handle = if !filter_data.is_empty() {
            self.write_raw_block(&filter_data)?
        } else {
            BlockHandle::new(0, 0)
        };
        self.properties.filter_size = filter_handle.size();

        let index_data = self.index_block.finish_with_trailer(CompressionType::None);
        let index_handle = self.write_raw_block(&index_data)?;
        self.properties.index_size = index_handle.size();

        let properties_data = seal_uncompressed(&self.properties.encode_block()?);
        let properties_handle = self.write_raw_block(&properties_data)?;

        let footer = Footer::new(index_handle, filter_handle, properties_handle);
        self.writer.write_all(&footer.encode())?;
        self.offset += FOOTER_SIZE as u64;

        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        debug!(
            file_number = self.file_number,
            file_size = self.offset,
            num_entries = self.properties.num_entries,
            "finished table"
        );

        Ok(SSTableInfo {
            file_number: self.file_number,
            file_size: self.offset,
            properties: self.properties,
        })
    }

    /// Get the current file size.
    pub fn file_size(&self) -> u64 {
        self.offset
    }
}

/// Append an uncompressed block trailer to `content`.
fn seal_uncompressed(content: &[u8]) -> Bytes {
    let compression = CompressionType::None.to_byte();
    let mut buf = BytesMut::with_capacity(content.len() + BLOCK_TRAILER_SIZE);
    buf.put_slice(content);
    buf.put_u32_le(block_checksum(content, compression));
    buf.put_u8(compression);
    buf.freeze()
}

/// Information about a completed SSTable.
#[derive(Debug, Clone)]
pub struct SSTableInfo {
    /// File number.
    pub file_number: u64,
    /// Total file size in bytes.
    pub file_size: u64,
    /// Properties written to the table.
    pub properties: TableProperties,
}

impl SSTableInfo {
    /// Number of entries.
    pub fn entry_count(&self) -> u64 {
        self.properties.num_entries
    }
}

/// Find a short separator between two keys.
///
/// Returns a key that is >= start and < limit.
fn find_short_separator(start: &[u8], limit: &[u8]) -> Vec<u8> {
    let min_len = std::cmp::min(start.len(), limit.len());
    let mut diff_index = 0;

    while diff_index < min_len && start[diff_index] == limit[diff_index] {
        diff_index += 1;
    }

    if diff_index < min_len {
        let diff_byte = start[diff_index];
        if diff_byte < 0xFF && diff_byte + 1 < limit[diff_index] {
            let mut result = start[..=diff_index].to_vec();
            result[diff_index] += 1;
            return result;
        }
    }

    start.to_vec()
}

/// Find a short successor to a key.
///
/// Returns the shortest key that is > input.
fn find_short_successor(key: &[u8]) -> Vec<u8> {
    match key.iter().position(|&b| b < 0xFF) {
        Some(i) => {
            let mut result = key[..=i].to_vec();
            result[i] += 1;
            result
        }
        // All 0xFF bytes
        None => key.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sstable::{SSTableReader, TableReader};
    use tempfile::tempdir;

    #[test]
    fn test_sstable_writer_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let writer = SSTableWriter::new(&path, 1, CompressionType::None, 10).unwrap();
        let info = writer.finish().unwrap();

        assert_eq!(info.entry_count(), 0);
        assert!(info.properties.smallest_key.is_empty());
        assert!(info.properties.largest_key.is_empty());
        assert_eq!(info.properties.num_data_blocks, 0);
        assert_eq!(info.properties.filter_size, 0);
    }

    #[test]
    fn test_sstable_writer_single_entry() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut writer = SSTableWriter::new(&path, 1, CompressionType::None, 10).unwrap();
        writer.add(b"key", b"value").unwrap();
        let info = writer.finish().unwrap();

        assert_eq!(info.entry_count(), 1);
        assert_eq!(info.properties.smallest_key.as_ref(), b"key");
        assert_eq!(info.properties.largest_key.as_ref(), b"key");
        assert_eq!(info.properties.raw_key_size, 3);
        assert_eq!(info.properties.raw_value_size, 5);
    }

    #[test]
    fn test_sstable_writer_rejects_unsorted_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut writer = SSTableWriter::new(&path, 1, CompressionType::None, 10).unwrap();
        writer.add(b"b", b"1").unwrap();
        assert!(matches!(
            writer.add(b"a", b"2"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            writer.add(b"b", b"3"),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(writer.entry_count(), 1);
    }

    #[test]
    fn test_sstable_writer_multiple_blocks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.sst");

        let mut writer =
            SSTableWriter::with_block_size(&path, 1, CompressionType::None, 10, 256).unwrap();

        for i in 0..100 {
            let key = format!("key_{:04}", i);
            let value = "x".repeat(50);
            writer.add(key.as_bytes(), value.as_bytes()).unwrap();
        }

        let info = writer.finish().unwrap();
        assert_eq!(info.entry_count(), 100);
        assert!(info.properties.num_data_blocks > 10);
        assert!(info.properties.data_size > 5000);
        assert!(info.properties.index_size > 0);
        assert!(info.properties.filter_size > 0);
        assert_eq!(info.file_size, std::fs::metadata(&path).unwrap().len());
    }

    #[test]
    fn test_user_properties_are_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("000007.sst");

        let mut writer = SSTableWriter::new(&path, 7, CompressionType::None, 10).unwrap();
        writer.add(b"a", b"1").unwrap();
        writer
            .add_user_property("max.timestamp", Bytes::from_static(b"\x00\x10"))
            .unwrap();
        assert!(matches!(
            writer.add_user_property("sst.num.entries", "5"),
            Err(Error::InvalidArgument(_))
        ));
        let info = writer.finish().unwrap();

        let reader = SSTableReader::open(&path, 7, true).unwrap();
        assert_eq!(reader.properties(), &info.properties);
        assert_eq!(
            reader.properties().user_property("max.timestamp").map(|v| v.as_ref()),
            Some(&b"\x00\x10"[..])
        );
    }

    #[test]
    fn test_find_short_separator() {
        assert_eq!(find_short_separator(b"abc", b"abz"), b"abd");
        assert_eq!(find_short_separator(b"abc", b"xyz"), b"b");

        // Adjacent bytes cannot be shortened
        assert_eq!(find_short_separator(b"abc", b"abd"), b"abc");
        assert_eq!(find_short_separator(b"abc", b"abcd"), b"abc");
    }

    #[test]
    fn test_find_short_successor() {
        assert_eq!(find_short_successor(b"abc"), b"b");
        assert_eq!(find_short_successor(b"a\xff\xff"), b"b");
        assert_eq!(find_short_successor(b"\xff\xff"), b"\xff\xff");
    }
}
