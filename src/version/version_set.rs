//! VersionSet - Manages current Version with atomic updates.
//!
//! The VersionSet is responsible for:
//! - Tracking the current Version
//! - Applying VersionEdits atomically
//! - Managing file number allocation
//! - Retiring deleted tables from the table cache

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::info;

use crate::cache::TableCache;
use crate::options::MAX_LEVELS;
use crate::{Error, Result};

use super::{FileMetadata, Version, VersionEdit};

/// Manages the set of versions and file numbers.
///
/// Readers load the current version without locking. Edits are applied one
/// at a time; each produces a new version that replaces the current one in
/// a single atomic store.
pub struct VersionSet {
    /// Current version (atomically swappable).
    current: ArcSwap<Version>,
    /// Next file number to allocate.
    next_file_number: AtomicU64,
    /// Serializes `log_and_apply`.
    apply_lock: Mutex<()>,
    /// Cache that deleted tables are retired from.
    table_cache: TableCache,
}

impl VersionSet {
    /// Create a VersionSet with an empty current version.
    pub fn new(table_cache: TableCache) -> Self {
        Self {
            current: ArcSwap::from_pointee(Version::new()),
            next_file_number: AtomicU64::new(1),
            apply_lock: Mutex::new(()),
            table_cache,
        }
    }

    /// Get the current version.
    pub fn current(&self) -> Arc<Version> {
        self.current.load_full()
    }

    /// Get next file number and increment.
    pub fn new_file_number(&self) -> u64 {
        self.next_file_number.fetch_add(1, Ordering::SeqCst)
    }

    /// Get current next file number without incrementing.
    pub fn next_file_number(&self) -> u64 {
        self.next_file_number.load(Ordering::SeqCst)
    }

    /// Mark a file number as used.
    pub fn mark_file_number_used(&self, num: u64) {
        self.next_file_number.fetch_max(num + 1, Ordering::SeqCst);
    }

    /// Apply `edit` and install the resulting version.
    ///
    /// Tables the edit deletes are retired from the table cache once the new
    /// version is visible. Scans already holding one of them keep reading
    /// it until they finish.
    pub fn log_and_apply(&self, edit: &VersionEdit) -> Result<()> {
        if let Some(&(level, _)) = edit.new_files.iter().find(|(level, _)| *level >= MAX_LEVELS) {
            return Err(Error::InvalidArgument(format!(
                "level {} out of range (max {})",
                level,
                MAX_LEVELS - 1
            )));
        }

        let _guard = self.apply_lock.lock();

        let current = self.current();
        let mut builder = VersionBuilder::from_version(&current);
        builder.apply(edit);
        let new_version = Arc::new(builder.build());

        if let Some(max) = edit.max_file_number() {
            self.mark_file_number_used(max);
        }

        let retired: Vec<u64> = edit
            .deleted_files
            .iter()
            .map(|&(_, file_number)| file_number)
            .filter(|&file_number| !new_version.contains_file(file_number))
            .collect();

        self.current.store(Arc::clone(&new_version));

        for &file_number in &retired {
            self.table_cache.evict(file_number);
        }

        info!(
            added = edit.new_files.len(),
            retired = retired.len(),
            total_files = new_version.total_files(),
            "installed new version"
        );

        Ok(())
    }

    /// Get the number of files at a level.
    pub fn num_files_at_level(&self, level: usize) -> usize {
        self.current().num_files(level)
    }

    /// Get total file count across all levels.
    pub fn total_files(&self) -> usize {
        self.current().total_files()
    }

    /// Get a summary of the version set.
    pub fn summary(&self) -> String {
        let current = self.current();
        let mut summary = String::new();
        for level in 0..MAX_LEVELS {
            let num_files = current.num_files(level);
            if num_files > 0 {
                let size = current.level_size(level);
                summary.push_str(&format!(
                    "L{}: {} files ({:.2} MB)\n",
                    level,
                    num_files,
                    size as f64 / (1024.0 * 1024.0)
                ));
            }
        }
        summary
    }
}

impl std::fmt::Debug for VersionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionSet")
            .field("total_files", &self.total_files())
            .field("next_file_number", &self.next_file_number())
            .finish()
    }
}

/// Builder for creating a new Version from edits.
struct VersionBuilder {
    /// Files at each level.
    files: [Vec<Arc<FileMetadata>>; MAX_LEVELS],
    /// Deleted files (level, file_number).
    deleted_files: HashSet<(usize, u64)>,
}

impl VersionBuilder {
    /// Create a builder from an existing version.
    fn from_version(version: &Version) -> Self {
        let mut files: [Vec<Arc<FileMetadata>>; MAX_LEVELS] = Default::default();
        for (level, level_files) in files.iter_mut().enumerate() {
            *level_files = version.files(level).to_vec();
        }
        Self {
            files,
            deleted_files: HashSet::new(),
        }
    }

    /// Apply a VersionEdit to this builder.
    fn apply(&mut self, edit: &VersionEdit) {
        for &(level, file_number) in &edit.deleted_files {
            self.deleted_files.insert((level, file_number));
        }

        for (level, file) in &edit.new_files {
            self.deleted_files.remove(&(*level, file.file_number()));
            self.files[*level].push(Arc::new(file.clone()));
        }
    }

    /// Build the final Version.
    fn build(mut self) -> Version {
        for (level, files) in self.files.iter_mut().enumerate() {
            files.retain(|f| !self.deleted_files.contains(&(level, f.file_number())));

            if level == 0 {
                // L0: newest first
                files.sort_by(|a, b| b.file_number().cmp(&a.file_number()));
            } else {
                files.sort();
            }
        }

        Version::with_files(self.files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::EntryState;
    use crate::testutil::{single_shard_options, MemoryOpener};

    fn make_file(num: u64, smallest: &'static str, largest: &'static str) -> FileMetadata {
        FileMetadata::new(num, 1024, smallest, largest, 1)
    }

    fn version_set_with(opener: &Arc<MemoryOpener>) -> (VersionSet, TableCache) {
        let cache = TableCache::new("/db", opener.clone(), &single_shard_options(8));
        (VersionSet::new(cache.clone()), cache)
    }

    #[test]
    fn test_version_set_new() {
        let (vset, _) = version_set_with(&Arc::new(MemoryOpener::new()));
        assert_eq!(vset.total_files(), 0);
        assert_eq!(vset.next_file_number(), 1);
    }

    #[test]
    fn test_version_set_file_numbers() {
        let (vset, _) = version_set_with(&Arc::new(MemoryOpener::new()));

        assert_eq!(vset.new_file_number(), 1);
        assert_eq!(vset.new_file_number(), 2);

        vset.mark_file_number_used(10);
        assert_eq!(vset.new_file_number(), 11);

        vset.mark_file_number_used(3);
        assert_eq!(vset.new_file_number(), 12);
    }

    #[test]
    fn test_log_and_apply_orders_levels() {
        let (vset, _) = version_set_with(&Arc::new(MemoryOpener::new()));

        let mut edit = VersionEdit::new();
        edit.add_file(0, make_file(1, "a", "c"));
        edit.add_file(0, make_file(3, "b", "d"));
        edit.add_file(1, make_file(5, "m", "z"));
        edit.add_file(1, make_file(4, "a", "l"));
        vset.log_and_apply(&edit).unwrap();

        let version = vset.current();
        let l0: Vec<u64> = version.files(0).iter().map(|f| f.file_number()).collect();
        let l1: Vec<u64> = version.files(1).iter().map(|f| f.file_number()).collect();
        assert_eq!(l0, vec![3, 1]);
        assert_eq!(l1, vec![4, 5]);
        assert_eq!(vset.next_file_number(), 6);
        assert!(vset.summary().contains("L1: 2 files"));
    }

    #[test]
    fn test_log_and_apply_keeps_old_version_intact() {
        let (vset, _) = version_set_with(&Arc::new(MemoryOpener::new()));

        let mut edit = VersionEdit::new();
        edit.add_file(0, make_file(1, "a", "c"));
        vset.log_and_apply(&edit).unwrap();
        let pinned = vset.current();

        let mut edit = VersionEdit::new();
        edit.delete_file(0, 1);
        edit.add_file(1, make_file(2, "a", "c"));
        vset.log_and_apply(&edit).unwrap();

        assert!(pinned.contains_file(1));
        assert!(!vset.current().contains_file(1));
        assert!(vset.current().contains_file(2));
    }

    #[test]
    fn test_log_and_apply_retires_deleted_tables() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(1, &[("a", "1")]);
        opener.add_table(2, &[("b", "2")]);
        let (vset, cache) = version_set_with(&opener);

        let mut edit = VersionEdit::new();
        edit.add_file(0, make_file(1, "a", "a"));
        edit.add_file(0, make_file(2, "b", "b"));
        vset.log_and_apply(&edit).unwrap();

        let pinned = cache.get_reader(1).unwrap();
        drop(cache.get_reader(2).unwrap());

        let mut edit = VersionEdit::new();
        edit.delete_file(0, 1);
        edit.delete_file(0, 2);
        vset.log_and_apply(&edit).unwrap();

        assert_eq!(cache.entry_state(1), EntryState::Retired);
        assert_eq!(cache.entry_state(2), EntryState::Absent);

        drop(pinned);
        assert_eq!(cache.entry_state(1), EntryState::Absent);
    }

    #[test]
    fn test_log_and_apply_rejects_bad_level() {
        let (vset, _) = version_set_with(&Arc::new(MemoryOpener::new()));

        let mut edit = VersionEdit::new();
        edit.add_file(MAX_LEVELS, make_file(1, "a", "b"));
        assert!(matches!(
            vset.log_and_apply(&edit),
            Err(Error::InvalidArgument(_))
        ));
        assert_eq!(vset.total_files(), 0);
    }
}
