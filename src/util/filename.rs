//! Table file naming conventions.

use std::path::{Path, PathBuf};

/// Extension used for table files.
pub const TABLE_EXTENSION: &str = "sst";

/// Generate an SSTable file path.
pub fn table_file_path(db_path: &Path, number: u64) -> PathBuf {
    db_path.join(format!("{:06}.{}", number, TABLE_EXTENSION))
}

/// Parse a table file name and return its number.
///
/// Returns `None` if the name is not a table file.
pub fn parse_table_file_name(name: &str) -> Option<u64> {
    let stem = name.strip_suffix(TABLE_EXTENSION)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
