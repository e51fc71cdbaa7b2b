//! TableStore - the read path over a directory of tables.
//!
//! The store coordinates:
//! - VersionSet for the live table list
//! - TableCache for opened readers
//! - SSTableWriter for adding tables
//!
//! # Thread Safety
//!
//! The store is thread-safe and can be shared across threads using Arc.
//! Scans and point lookups run concurrently with version changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};

use crate::arena::ScanArena;
use crate::cache::TableCache;
use crate::iterator::{ScanIterator, ScopedIterator};
use crate::options::{Options, ReadOptions};
use crate::sstable::{SSTableOpener, SSTableWriter};
use crate::util::filename::{parse_table_file_name, table_file_path};
use crate::version::{FileMetadata, Version, VersionEdit, VersionSet};
use crate::{Error, Result};

/// A set of tables in one directory, read through a shared table cache.
pub struct TableStore {
    /// Store directory path.
    db_path: PathBuf,
    /// Store options.
    options: Arc<Options>,
    /// Cache of opened table readers.
    table_cache: TableCache,
    /// Version set for file management.
    versions: VersionSet,
}

impl TableStore {
    /// Open the store at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Self::open_with_options(path, Options::default())
    }

    /// Open the store at `path`.
    ///
    /// Existing table files are placed in level 0, newest first.
    pub fn open_with_options(path: impl AsRef<Path>, options: Options) -> Result<Arc<Self>> {
        options.validate()?;
        let db_path = path.as_ref().to_path_buf();

        if !db_path.exists() {
            if options.create_if_missing {
                fs::create_dir_all(&db_path)?;
            } else {
                return Err(Error::NotFound(format!(
                    "Store directory does not exist: {}",
                    db_path.display()
                )));
            }
        }

        let opener = Arc::new(SSTableOpener::new(options.paranoid_checks));
        let table_cache = TableCache::new(&db_path, opener, &options);
        let versions = VersionSet::new(table_cache.clone());

        let recovered = Self::recover(&db_path, &table_cache)?;
        if !recovered.is_empty() {
            let mut edit = VersionEdit::new();
            for file in recovered {
                edit.add_file(0, file);
            }
            versions.log_and_apply(&edit)?;
        }

        info!(
            path = %db_path.display(),
            tables = versions.total_files(),
            "opened table store"
        );

        Ok(Arc::new(Self {
            db_path,
            options: Arc::new(options),
            table_cache,
            versions,
        }))
    }

    /// Describe every table file in `db_path`.
    fn recover(db_path: &Path, table_cache: &TableCache) -> Result<Vec<FileMetadata>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(db_path)? {
            let entry = entry?;
            let Some(file_number) = entry.file_name().to_str().and_then(parse_table_file_name)
            else {
                continue;
            };

            let file_size = entry.metadata()?.len();
            let handle = table_cache.get_reader(file_number)?;
            files.push(FileMetadata::from_properties(
                file_number,
                file_size,
                handle.reader().properties(),
            ));
            debug!(file_number, file_size, "recovered table");
        }
        Ok(files)
    }

    /// Get the store path.
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// Get the store options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Allocate a file number for a new table.
    pub fn new_file_number(&self) -> u64 {
        self.versions.new_file_number()
    }

    /// Create a writer for table `file_number` using the store's options.
    ///
    /// The table becomes visible once an edit adding it is applied.
    pub fn table_writer(&self, file_number: u64) -> Result<SSTableWriter> {
        SSTableWriter::with_block_size(
            &table_file_path(&self.db_path, file_number),
            file_number,
            self.options.compression,
            self.options.bloom_filter_bits_per_key,
            self.options.block_size,
        )
    }

    /// Install a new version. Deleted tables are retired from the cache.
    pub fn log_and_apply(&self, edit: &VersionEdit) -> Result<()> {
        self.versions.log_and_apply(edit)
    }

    /// Get the current version.
    pub fn current_version(&self) -> Arc<Version> {
        self.versions.current()
    }

    /// Get the table cache.
    pub fn table_cache(&self) -> &TableCache {
        &self.table_cache
    }

    /// Look up `key`, newest table first.
    ///
    /// The scan predicate in `read_options` is not consulted.
    pub fn get(&self, key: &[u8], read_options: &ReadOptions) -> Result<Option<Bytes>> {
        loop {
            let version = self.versions.current();
            match self.get_from_version(&version, key, read_options) {
                Err(Error::TableRetired(file_number)) if self.version_changed(&version) => {
                    debug!(file_number, "table retired during lookup, retrying");
                }
                result => return result,
            }
        }
    }

    fn get_from_version(
        &self,
        version: &Version,
        key: &[u8],
        read_options: &ReadOptions,
    ) -> Result<Option<Bytes>> {
        for file in version.files_for_key(key) {
            let handle = self.table_cache.get_reader(file.file_number())?;
            if let Some(value) = handle.reader().get(key, read_options)? {
                return Ok(Some(value));
            }
        }
        Ok(None)
    }

    /// Start a scan over the current version.
    ///
    /// Every table in range gets its iterator up front, so the scan's
    /// `table_filter` runs exactly once per table, also when setup restarts
    /// because a table was retired by a concurrent version change. Any table failing to open
    /// fails the whole scan; references taken so far are released before the
    /// error is returned.
    pub fn scan<'a>(
        &self,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
    ) -> Result<ScanIterator<'a>> {
        // Filter decisions outlive a retried setup.
        let mut admitted = HashMap::new();
        loop {
            let version = self.versions.current();
            match self.table_iterators(&version, read_options, arena, &mut admitted) {
                Ok(children) => {
                    debug!(tables = children.len(), "created scan");
                    return Ok(ScanIterator::new(
                        version,
                        children,
                        read_options.iterate_lower_bound.clone(),
                        read_options.iterate_upper_bound.clone(),
                    ));
                }
                // A table picked from a superseded version was retired under us.
                Err(Error::TableRetired(file_number)) if self.version_changed(&version) => {
                    debug!(file_number, "table retired during scan setup, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn table_iterators<'a>(
        &self,
        version: &Version,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
        admitted: &mut HashMap<u64, bool>,
    ) -> Result<Vec<ScopedIterator<'a>>> {
        let tables = version.tables_for_range(
            read_options.iterate_lower_bound.as_deref(),
            read_options.iterate_upper_bound.as_deref(),
        );

        let mut children = Vec::with_capacity(tables.len());
        for file_number in tables {
            let child = match &read_options.table_filter {
                Some(filter) => {
                    self.table_cache
                        .new_iterator_with(file_number, read_options, arena, |props| {
                            *admitted
                                .entry(file_number)
                                .or_insert_with(|| filter(props))
                        })?
                }
                None => self
                    .table_cache
                    .new_iterator(file_number, read_options, arena)?,
            };
            children.push(child);
        }
        Ok(children)
    }

    fn version_changed(&self, version: &Arc<Version>) -> bool {
        !Arc::ptr_eq(version, &self.versions.current())
    }

    /// Human-readable summary of the live tables.
    pub fn summary(&self) -> String {
        self.versions.summary()
    }
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("db_path", &self.db_path)
            .field("versions", &self.versions)
            .field("table_cache", &self.table_cache)
            .finish()
    }
}
