//! SSTable - Sorted String Table for on-disk storage.
//!
//! SSTables are immutable, sorted files that store key-value pairs.
//! Opening a table reads only its footer, index, filter and properties;
//! data blocks are read lazily as iterators are positioned.
//!
//! # File Format
//!
//! ```text
//! +------------------+
//! | Data Block 1     |
//! +------------------+
//! | ...              |
//! +------------------+
//! | Data Block N     |
//! +------------------+
//! | Filter Block     |  (Bloom filter)
//! +------------------+
//! | Index Block      |  (Block handles for data blocks)
//! +------------------+
//! | Properties Block |  (name -> value, sorted by name)
//! +------------------+
//! | Footer           |  (Index, filter and properties handles + magic)
//! +------------------+
//! ```
//!
//! # Data Block Format
//!
//! ```text
//! +------------------+
//! | Entry 1          |  shared_len | unshared_len | value_len | key_delta | value
//! +------------------+
//! | ...              |
//! +------------------+
//! | Restart Point 0  |  (4 bytes, offset)
//! +------------------+
//! | ...              |
//! +------------------+
//! | Num Restarts     |  (4 bytes)
//! +------------------+
//! | CRC + Type       |  (5 bytes)
//! +------------------+
//! ```

mod block;
mod block_builder;
mod filter;
mod iterator;
mod properties;
mod reader;
mod writer;

pub use block::BlockHandle;
pub use properties::{TableProperties, RESERVED_PROPERTY_PREFIX};
pub use reader::SSTableReader;
pub use writer::{SSTableInfo, SSTableWriter};

use std::path::Path;
use std::sync::Arc;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::arena::ScanArena;
use crate::iterator::InternalIterator;
use crate::options::ReadOptions;
use crate::{Error, Result};

/// Magic number for SSTable footer (8 bytes).
pub const FOOTER_MAGIC: u64 = 0x5373_7452_6561_6401;

/// Footer size: three block handles (48) + magic (8) = 56 bytes.
pub const FOOTER_SIZE: usize = 3 * 16 + 8;

/// Default block size (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Block trailer size: CRC (4) + Type (1) = 5 bytes.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Compression type for blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    #[default]
    None = 0,
    /// Snappy compression.
    Snappy = 1,
    /// LZ4 compression.
    Lz4 = 2,
}

impl CompressionType {
    /// Create from byte.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Convert to byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Footer of an SSTable file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Footer {
    /// Handle to the index block.
    pub index_handle: BlockHandle,
    /// Handle to the filter block (size 0 when the table has no filter).
    pub filter_handle: BlockHandle,
    /// Handle to the properties block.
    pub properties_handle: BlockHandle,
}

impl Footer {
    /// Create a new footer.
    pub fn new(
        index_handle: BlockHandle,
        filter_handle: BlockHandle,
        properties_handle: BlockHandle,
    ) -> Self {
        Self {
            index_handle,
            filter_handle,
            properties_handle,
        }
    }

    /// Encode the footer to bytes.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE);
        self.index_handle.encode_to(&mut buf);
        self.filter_handle.encode_to(&mut buf);
        self.properties_handle.encode_to(&mut buf);
        buf.put_u64_le(FOOTER_MAGIC);
        buf.freeze()
    }

    /// Decode a footer from the tail of `data`.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::corruption("footer too short"));
        }

        let mut cursor = &data[data.len() - FOOTER_SIZE..];

        let index_handle = BlockHandle::decode(&mut cursor)?;
        let filter_handle = BlockHandle::decode(&mut cursor)?;
        let properties_handle = BlockHandle::decode(&mut cursor)?;

        let magic = cursor.get_u64_le();
        if magic != FOOTER_MAGIC {
            return Err(Error::invalid_format("invalid footer magic"));
        }

        Ok(Self {
            index_handle,
            filter_handle,
            properties_handle,
        })
    }
}

/// An opened table.
///
/// Implementations parse only their footer and index structures on open.
/// Many iterators may share one reader; each holds the reader through an
/// `Arc`, so the reader outlives every iterator derived from it.
pub trait TableReader: Send + Sync {
    /// Identity of the table file.
    fn file_number(&self) -> u64;

    /// Statistics recorded when the table was built.
    fn properties(&self) -> &TableProperties;

    /// Smallest key stored in the table (empty for an empty table).
    fn smallest_key(&self) -> &[u8] {
        &self.properties().smallest_key
    }

    /// Largest key stored in the table (empty for an empty table).
    fn largest_key(&self) -> &[u8] {
        &self.properties().largest_key
    }

    /// Point lookup of `key`.
    fn get(&self, key: &[u8], read_options: &ReadOptions) -> Result<Option<Bytes>>;

    /// Create an iterator over the table's records in key order.
    ///
    /// The iterator decodes data blocks lazily as it is positioned and draws
    /// its scratch memory from `arena`.
    fn new_iterator<'a>(
        self: Arc<Self>,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
    ) -> Result<Box<dyn InternalIterator + 'a>>;

    /// Approximate heap memory held by the reader.
    fn approximate_memory_usage(&self) -> usize;
}

/// Opens table files on behalf of the table cache.
pub trait TableOpener: Send + Sync {
    /// Open the table stored at `path`.
    fn open(&self, path: &Path, file_number: u64) -> Result<Arc<dyn TableReader>>;
}

/// Opens files written by [`SSTableWriter`].
#[derive(Debug, Clone, Default)]
pub struct SSTableOpener {
    verify_checksums: bool,
}

impl SSTableOpener {
    /// Create an opener. `verify_checksums` applies to the blocks read at open.
    pub fn new(verify_checksums: bool) -> Self {
        Self { verify_checksums }
    }
}

impl TableOpener for SSTableOpener {
    fn open(&self, path: &Path, file_number: u64) -> Result<Arc<dyn TableReader>> {
        let reader = SSTableReader::open(path, file_number, self.verify_checksums)?;
        Ok(Arc::new(reader))
    }
}
