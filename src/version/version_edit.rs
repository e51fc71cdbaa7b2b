//! VersionEdit - describes changes between versions.

use std::collections::HashSet;

use super::FileMetadata;

/// A VersionEdit describes the changes between two Versions.
///
/// It records:
/// - New files to add
/// - Files to delete
#[derive(Debug, Clone, Default)]
pub struct VersionEdit {
    /// Files to delete: (level, file_number).
    pub deleted_files: HashSet<(usize, u64)>,
    /// New files to add: (level, FileMetadata).
    pub new_files: Vec<(usize, FileMetadata)>,
}

impl VersionEdit {
    /// Create a new empty edit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file to delete.
    pub fn delete_file(&mut self, level: usize, file_number: u64) {
        self.deleted_files.insert((level, file_number));
    }

    /// Add a new file.
    pub fn add_file(&mut self, level: usize, file: FileMetadata) {
        self.new_files.push((level, file));
    }

    /// Check if the edit is empty.
    pub fn is_empty(&self) -> bool {
        self.deleted_files.is_empty() && self.new_files.is_empty()
    }

    /// Highest file number this edit adds, if any.
    pub fn max_file_number(&self) -> Option<u64> {
        self.new_files.iter().map(|(_, f)| f.file_number()).max()
    }
}
