//! # sstread
//!
//! The read path of an LSM-tree store: a bounded cache of opened SSTable
//! readers and per-scan table filtering.
//!
//! ## Features
//!
//! - **Table Cache**: Sharded LRU cache of open readers; concurrent lookups
//!   of one table share a single open
//! - **Safe Retirement**: Tables removed by a version change stay readable
//!   by scans that already hold them
//! - **Table Filters**: A scan can skip whole tables based on their stored
//!   properties, without reading their data blocks
//! - **Scoped Iterators**: Table iterators release their cache references
//!   through a cleanup chain when they end
//! - **Compression**: Optional LZ4/Snappy compression
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sstread::{FileMetadata, ReadOptions, ScanArena, TableStore, VersionEdit};
//!
//! let store = TableStore::open("./my_tables")?;
//!
//! // Write a table and make it visible
//! let file_number = store.new_file_number();
//! let mut writer = store.table_writer(file_number)?;
//! writer.add(b"hello", b"world")?;
//! let info = writer.finish()?;
//! let mut edit = VersionEdit::new();
//! edit.add_file(0, FileMetadata::from_info(&info));
//! store.log_and_apply(&edit)?;
//!
//! // Scan, skipping tables with a single entry
//! let read_options = ReadOptions::new().with_table_filter(|props| props.num_entries > 1);
//! let arena = ScanArena::new();
//! let mut scan = store.scan(&read_options, &arena)?;
//! scan.seek_to_first()?;
//! while scan.valid() {
//!     println!("{:?}", scan.key());
//!     scan.next()?;
//! }
//! ```

// Public modules
pub mod error;
pub mod options;

// Store facade
mod store;

// Internal modules
mod arena;
mod cache;
mod iterator;
mod sstable;
mod util;
mod version;

#[cfg(test)]
mod testutil;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use options::{CompressionType, Options, OptionsBuilder, ReadOptions, TableFilter};

// Store
pub use store::TableStore;

// Cache
pub use cache::{CacheStats, CacheStatsSnapshot, EntryState, TableCache, TableHandle};

// Iterators
pub use arena::ScanArena;
pub use iterator::{
    CleanupChain, DedupMergeIterator, EmptyIterator, InternalIterator, MergeIterator,
    ScanIterator, ScopedIterator,
};

// Tables
pub use sstable::{
    SSTableInfo, SSTableOpener, SSTableReader, SSTableWriter, TableOpener, TableProperties,
    TableReader, RESERVED_PROPERTY_PREFIX,
};

// Versions
pub use version::{FileMetadata, Version, VersionEdit, VersionSet};
