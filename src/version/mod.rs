//! Version management for tracking live table files.
//!
//! The version system provides:
//! - **FileMetadata**: Information about each table file
//! - **Version**: Immutable snapshot of all files organized by level
//! - **VersionEdit**: Files added and removed between versions
//! - **VersionSet**: Owns the current Version and swaps it atomically
//!
//! # File Organization
//!
//! ```text
//! Level 0:  [SST-3] [SST-2] [SST-1]  (overlapping keys, newest first)
//! Level 1:  [SST-4][SST-5][SST-6]    (non-overlapping, sorted)
//! Level 2:  [SST-7][SST-8][SST-9][SST-10]  (non-overlapping, sorted)
//! ...
//! ```
//!
//! Scans pin the version they start from; applying an edit never changes a
//! version someone already holds.

mod file_metadata;
mod version;
mod version_edit;
mod version_set;

pub use file_metadata::FileMetadata;
pub use version::Version;
pub use version_edit::VersionEdit;
pub use version_set::VersionSet;
