//! SSTable reader for reading immutable sorted files.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::trace;

use crate::arena::ScanArena;
use crate::iterator::InternalIterator;
use crate::options::ReadOptions;
use crate::{Error, Result};

use super::block::Block;
use super::filter::BloomFilter;
use super::iterator::SSTableIterator;
use super::properties::TableProperties;
use super::{BlockHandle, Footer, TableReader, FOOTER_SIZE};

/// Reader for SSTable files.
///
/// Opening reads the footer, index block, filter block and properties
/// block; data blocks are read on demand. The reader is shared between
/// threads, so file access is serialized through a mutex.
pub struct SSTableReader {
    /// File handle.
    file: Mutex<File>,
    /// File size.
    file_size: u64,
    /// File number.
    file_number: u64,
    /// Index block.
    index_block: Block,
    /// Bloom filter (if present).
    filter: Option<BloomFilter>,
    /// Properties recorded by the writer.
    properties: TableProperties,
}

impl SSTableReader {
    /// Open an SSTable file for reading.
    pub fn open(path: &Path, file_number: u64, verify_checksums: bool) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small for footer"));
        }

        let mut footer_buf = vec![0u8; FOOTER_SIZE];
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let mut scratch = Vec::new();

        read_at(&mut file, file_size, &footer.index_handle, &mut scratch)?;
        let index_block = Block::new_with_trailer(&scratch, verify_checksums)?;

        read_at(&mut file, file_size, &footer.properties_handle, &mut scratch)?;
        let properties_block = Block::new_with_trailer(&scratch, verify_checksums)?;
        let properties = TableProperties::decode_block(&properties_block)?;

        let filter = if footer.filter_handle.size() > 0 {
            read_at(&mut file, file_size, &footer.filter_handle, &mut scratch)?;
            BloomFilter::from_bytes(Bytes::copy_from_slice(&scratch))
        } else {
            None
        };

        trace!(
            file_number,
            file_size,
            num_entries = properties.num_entries,
            "parsed table metadata"
        );

        Ok(Self {
            file: Mutex::new(file),
            file_size,
            file_number,
            index_block,
            filter,
            properties,
        })
    }

    /// Get the file size.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Check if a key might exist using the bloom filter.
    pub fn may_contain(&self, key: &[u8]) -> bool {
        match &self.filter {
            Some(filter) => filter.may_contain(key),
            None => true,
        }
    }

    /// Read a block by handle, using `scratch` for the raw bytes.
    pub fn read_block(
        &self,
        handle: &BlockHandle,
        verify_checksums: bool,
        scratch: &mut Vec<u8>,
    ) -> Result<Block> {
        {
            let mut file = self.file.lock();
            read_at(&mut file, self.file_size, handle, scratch)?;
        }
        Block::new_with_trailer(scratch, verify_checksums)
    }

    /// Get the index block.
    pub fn index_block(&self) -> &Block {
        &self.index_block
    }
}

/// Read the raw bytes of `handle` into `buf`.
fn read_at(file: &mut File, file_size: u64, handle: &BlockHandle, buf: &mut Vec<u8>) -> Result<()> {
    let end = handle.offset().checked_add(handle.size());
    if end.map_or(true, |end| end > file_size - FOOTER_SIZE as u64) {
        return Err(Error::corruption(format!(
            "block handle {}+{} beyond end of table data",
            handle.offset(),
            handle.size()
        )));
    }

    buf.clear();
    buf.resize(handle.size() as usize, 0);
    file.seek(SeekFrom::Start(handle.offset()))?;
    file.read_exact(buf)?;
    Ok(())
}

/// Decode the block handle stored in an index entry.
pub(super) fn decode_index_value(value: &[u8]) -> Result<BlockHandle> {
    let mut cursor = value;
    BlockHandle::decode(&mut cursor)
}

impl TableReader for SSTableReader {
    fn file_number(&self) -> u64 {
        self.file_number
    }

    fn properties(&self) -> &TableProperties {
        &self.properties
    }

    fn get(&self, key: &[u8], read_options: &ReadOptions) -> Result<Option<Bytes>> {
        if !self.may_contain(key) {
            return Ok(None);
        }

        // Index keys are >= the last key of their block.
        let mut index_iter = self.index_block.iter();
        index_iter.seek(key);
        if !index_iter.valid() {
            return Ok(None);
        }

        let handle = decode_index_value(index_iter.value())?;
        let mut scratch = Vec::new();
        let block = self.read_block(&handle, read_options.verify_checksums, &mut scratch)?;

        let mut block_iter = block.iter();
        block_iter.seek(key);

        if block_iter.valid() && block_iter.key() == key {
            Ok(Some(block_iter.value().clone()))
        } else if block_iter.is_corrupted() {
            Err(Error::corruption("malformed data block entry"))
        } else {
            Ok(None)
        }
    }

    fn new_iterator<'a>(
        self: Arc<Self>,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
    ) -> Result<Box<dyn InternalIterator + 'a>> {
        Ok(Box::new(SSTableIterator::new(
            self,
            read_options.verify_checksums,
            arena,
        )))
    }

    fn approximate_memory_usage(&self) -> usize {
        self.index_block.size()
            + self.filter.as_ref().map_or(0, |f| f.size())
            + self.properties.approximate_memory_usage()
    }
}

impl std::fmt::Debug for SSTableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTableReader")
            .field("file_number", &self.file_number)
            .field("file_size", &self.file_size)
            .field("num_entries", &self.properties.num_entries)
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}
