//! Configuration options for sstread.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

pub use crate::sstable::CompressionType;
use crate::sstable::TableProperties;

/// Maximum number of levels in the LSM tree.
pub const MAX_LEVELS: usize = 7;

/// Default block size (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default bloom filter bits per key.
pub const DEFAULT_BLOOM_BITS_PER_KEY: usize = 10;

/// Default table cache capacity, in open readers.
pub const DEFAULT_MAX_OPEN_FILES: usize = 1000;

/// Default table cache shard bits (16 shards).
pub const DEFAULT_TABLE_CACHE_SHARD_BITS: u32 = 4;

/// Largest accepted `table_cache_shard_bits`.
pub const MAX_TABLE_CACHE_SHARD_BITS: u32 = 10;

/// Store configuration options.
#[derive(Debug, Clone)]
pub struct Options {
    // === Storage ===
    /// Create the directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Verify block checksums when opening tables.
    pub paranoid_checks: bool,

    // === SSTable ===
    /// Target size for data blocks.
    pub block_size: usize,

    /// Compression algorithm for data blocks.
    pub compression: CompressionType,

    /// Bloom filter bits per key (0 to disable).
    pub bloom_filter_bits_per_key: usize,

    // === Cache ===
    /// Maximum number of open readers in the table cache.
    pub max_open_files: usize,

    /// The table cache is split into `2^table_cache_shard_bits` shards.
    pub table_cache_shard_bits: u32,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            paranoid_checks: false,

            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionType::default(),
            bloom_filter_bits_per_key: DEFAULT_BLOOM_BITS_PER_KEY,

            max_open_files: DEFAULT_MAX_OPEN_FILES,
            table_cache_shard_bits: DEFAULT_TABLE_CACHE_SHARD_BITS,
        }
    }
}

impl Options {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the options.
    pub fn validate(&self) -> crate::Result<()> {
        if self.block_size < 256 {
            return Err(crate::Error::InvalidConfiguration(
                "block_size must be at least 256 bytes".into(),
            ));
        }

        if self.max_open_files == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "max_open_files must be at least 1".into(),
            ));
        }

        if self.table_cache_shard_bits > MAX_TABLE_CACHE_SHARD_BITS {
            return Err(crate::Error::InvalidConfiguration(format!(
                "table_cache_shard_bits cannot exceed {}",
                MAX_TABLE_CACHE_SHARD_BITS
            )));
        }

        Ok(())
    }
}

/// Builder for Options.
#[derive(Debug, Clone, Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Create a new builder with default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set create_if_missing.
    pub fn create_if_missing(mut self, value: bool) -> Self {
        self.options.create_if_missing = value;
        self
    }

    /// Set paranoid_checks.
    pub fn paranoid_checks(mut self, value: bool) -> Self {
        self.options.paranoid_checks = value;
        self
    }

    /// Set block size.
    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    /// Set compression.
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.options.compression = compression;
        self
    }

    /// Set bloom filter bits per key.
    pub fn bloom_filter_bits(mut self, bits: usize) -> Self {
        self.options.bloom_filter_bits_per_key = bits;
        self
    }

    /// Set table cache capacity.
    pub fn max_open_files(mut self, count: usize) -> Self {
        self.options.max_open_files = count;
        self
    }

    /// Set table cache shard bits.
    pub fn table_cache_shard_bits(mut self, bits: u32) -> Self {
        self.options.table_cache_shard_bits = bits;
        self
    }

    /// Build the options.
    pub fn build(self) -> crate::Result<Options> {
        self.options.validate()?;
        Ok(self.options)
    }
}

/// Per-scan table predicate.
///
/// Receives one table's properties and returns whether the table may hold
/// records the scan needs. Returning `false` skips the whole table, so the
/// predicate must only reject tables that certainly hold nothing relevant.
pub type TableFilter = Arc<dyn Fn(&TableProperties) -> bool + Send + Sync>;

/// Options for one read.
#[derive(Clone)]
pub struct ReadOptions {
    /// Verify block checksums on data blocks read by this scan.
    pub verify_checksums: bool,

    /// Tables whose properties this rejects contribute nothing to the scan.
    /// `None` scans every table.
    pub table_filter: Option<TableFilter>,

    /// Smallest key returned (inclusive).
    pub iterate_lower_bound: Option<Bytes>,

    /// First key not returned (exclusive).
    pub iterate_upper_bound: Option<Bytes>,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
            table_filter: None,
            iterate_lower_bound: None,
            iterate_upper_bound: None,
        }
    }
}

impl ReadOptions {
    /// Create read options with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the table filter.
    pub fn with_table_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&TableProperties) -> bool + Send + Sync + 'static,
    {
        self.table_filter = Some(Arc::new(filter));
        self
    }

    /// Set checksum verification.
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Set the inclusive lower bound.
    pub fn with_lower_bound(mut self, key: impl Into<Bytes>) -> Self {
        self.iterate_lower_bound = Some(key.into());
        self
    }

    /// Set the exclusive upper bound.
    pub fn with_upper_bound(mut self, key: impl Into<Bytes>) -> Self {
        self.iterate_upper_bound = Some(key.into());
        self
    }
}

impl fmt::Debug for ReadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOptions")
            .field("verify_checksums", &self.verify_checksums)
            .field("table_filter", &self.table_filter.as_ref().map(|_| "<fn>"))
            .field("iterate_lower_bound", &self.iterate_lower_bound)
            .field("iterate_upper_bound", &self.iterate_upper_bound)
            .finish()
    }
}
