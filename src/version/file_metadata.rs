//! File metadata for SSTable files.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::sstable::{SSTableInfo, TableProperties};

/// Metadata about an SSTable file.
///
/// Contains what a version needs to place a table: its identity, size and
/// key range.
#[derive(Debug, Clone)]
pub struct FileMetadata {
    /// Unique file number.
    file_number: u64,
    /// File size in bytes.
    file_size: u64,
    /// Smallest key in the file.
    smallest: Bytes,
    /// Largest key in the file.
    largest: Bytes,
    /// Number of entries in the file.
    num_entries: u64,
}

impl FileMetadata {
    /// Create new file metadata.
    pub fn new(
        file_number: u64,
        file_size: u64,
        smallest: impl Into<Bytes>,
        largest: impl Into<Bytes>,
        num_entries: u64,
    ) -> Self {
        Self {
            file_number,
            file_size,
            smallest: smallest.into(),
            largest: largest.into(),
            num_entries,
        }
    }

    /// Describe a freshly written table.
    pub fn from_info(info: &SSTableInfo) -> Self {
        Self::from_properties(info.file_number, info.file_size, &info.properties)
    }

    /// Describe a table from its stored properties.
    pub fn from_properties(file_number: u64, file_size: u64, props: &TableProperties) -> Self {
        Self::new(
            file_number,
            file_size,
            props.smallest_key.clone(),
            props.largest_key.clone(),
            props.num_entries,
        )
    }

    /// Get the file number.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Get the file size.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Get the smallest key.
    pub fn smallest(&self) -> &[u8] {
        &self.smallest
    }

    /// Get the largest key.
    pub fn largest(&self) -> &[u8] {
        &self.largest
    }

    /// Get the number of entries.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Check if the file's key range overlaps `[smallest, largest]`.
    pub fn overlaps(&self, smallest: &[u8], largest: &[u8]) -> bool {
        self.largest() >= smallest && self.smallest() <= largest
    }

    /// Check if the file's key range overlaps `[lower, upper)`.
    ///
    /// A missing bound is unbounded on that side.
    pub fn overlaps_range(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> bool {
        if self.num_entries == 0 {
            return false;
        }
        let after_lower = lower.map_or(true, |lower| self.largest() >= lower);
        let before_upper = upper.map_or(true, |upper| self.smallest() < upper);
        after_lower && before_upper
    }

    /// Check if a key might be in this file.
    pub fn may_contain_key(&self, key: &[u8]) -> bool {
        self.num_entries > 0 && key >= self.smallest() && key <= self.largest()
    }
}

impl PartialEq for FileMetadata {
    fn eq(&self, other: &Self) -> bool {
        self.file_number == other.file_number
    }
}

impl Eq for FileMetadata {}

impl PartialOrd for FileMetadata {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FileMetadata {
    fn cmp(&self, other: &Self) -> Ordering {
        // Sort by smallest key first, then by file number for stability
        match self.smallest().cmp(other.smallest()) {
            Ordering::Equal => self.file_number.cmp(&other.file_number),
            ord => ord,
        }
    }
}
