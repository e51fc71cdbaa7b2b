//! Version - immutable snapshot of live SSTable files.

use std::sync::Arc;

use crate::options::MAX_LEVELS;

use super::FileMetadata;

/// An immutable snapshot of all SSTable files at a point in time.
///
/// Versions are shared through `Arc`; a scan holds the version it started
/// from so the table list it was built over stays meaningful.
#[derive(Debug, Clone, Default)]
pub struct Version {
    /// Files at each level (0 to MAX_LEVELS-1).
    /// Level 0 is ordered newest first; higher levels are sorted and
    /// non-overlapping.
    files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],

    /// Total file size at each level.
    level_sizes: [u64; MAX_LEVELS],
}

impl Version {
    /// Create an empty version.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a version with the given files.
    pub fn with_files(files: [Vec<Arc<FileMetadata>>; MAX_LEVELS]) -> Self {
        let mut level_sizes = [0u64; MAX_LEVELS];
        for (level, level_files) in files.iter().enumerate() {
            level_sizes[level] = level_files.iter().map(|f| f.file_size()).sum();
        }

        Self { files, level_sizes }
    }

    /// Get files at a specific level.
    pub fn files(&self, level: usize) -> &[Arc<FileMetadata>] {
        &self.files[level]
    }

    /// Get number of files at a level.
    pub fn num_files(&self, level: usize) -> usize {
        self.files[level].len()
    }

    /// Get total number of files across all levels.
    pub fn total_files(&self) -> usize {
        self.files.iter().map(|f| f.len()).sum()
    }

    /// Get total size at a level.
    pub fn level_size(&self, level: usize) -> u64 {
        self.level_sizes[level]
    }

    /// Check whether `file_number` is live in this version.
    pub fn contains_file(&self, file_number: u64) -> bool {
        self.all_files()
            .any(|(_, file)| file.file_number() == file_number)
    }

    /// Find files that overlap with `[smallest, largest]` at a given level.
    pub fn get_overlapping_files(
        &self,
        level: usize,
        smallest: &[u8],
        largest: &[u8],
    ) -> Vec<Arc<FileMetadata>> {
        if level == 0 {
            // Level 0 files may overlap, check all
            return self.files[0]
                .iter()
                .filter(|file| file.overlaps(smallest, largest))
                .cloned()
                .collect();
        }

        let files = &self.files[level];
        let start_idx = files.partition_point(|f| f.largest() < smallest);
        files[start_idx..]
            .iter()
            .take_while(|file| file.smallest() <= largest)
            .filter(|file| file.overlaps(smallest, largest))
            .cloned()
            .collect()
    }

    /// Files that might hold `key`, newest data first.
    pub fn files_for_key(&self, key: &[u8]) -> Vec<Arc<FileMetadata>> {
        (0..MAX_LEVELS)
            .flat_map(|level| self.get_overlapping_files(level, key, key))
            .filter(|file| file.may_contain_key(key))
            .collect()
    }

    /// Tables a scan over `[lower, upper)` has to visit, newest data first.
    ///
    /// Level 0 files come first in their newest-first order, followed by each
    /// deeper level in key order.
    pub fn tables_for_range(&self, lower: Option<&[u8]>, upper: Option<&[u8]>) -> Vec<u64> {
        self.all_files()
            .filter(|(_, file)| file.overlaps_range(lower, upper))
            .map(|(_, file)| file.file_number())
            .collect()
    }

    /// Get an iterator over all files at all levels.
    pub fn all_files(&self) -> impl Iterator<Item = (usize, &Arc<FileMetadata>)> {
        self.files
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.iter().map(move |f| (level, f)))
    }
}
