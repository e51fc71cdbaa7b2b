//! Shared fixtures for unit tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::arena::ScanArena;
use crate::iterator::InternalIterator;
use crate::options::{Options, ReadOptions};
use crate::sstable::{
    CompressionType, SSTableInfo, SSTableWriter, TableOpener, TableProperties, TableReader,
};
use crate::util::filename::table_file_path;
use crate::{Error, Result};

/// Options for a cache with one shard, so LRU order is global.
pub fn single_shard_options(capacity: usize) -> Options {
    Options {
        max_open_files: capacity,
        table_cache_shard_bits: 0,
        ..Options::default()
    }
}

/// Write a table file named after `file_number` under `dir`.
pub fn write_table(dir: &Path, file_number: u64, pairs: &[(&str, &str)]) -> SSTableInfo {
    let path = table_file_path(dir, file_number);
    let mut writer = SSTableWriter::new(&path, file_number, CompressionType::None, 10).unwrap();
    for (key, value) in pairs {
        writer.add(key.as_bytes(), value.as_bytes()).unwrap();
    }
    writer.finish().unwrap()
}

fn to_entries(pairs: &[(&str, &str)]) -> Vec<(Bytes, Bytes)> {
    let mut entries: Vec<(Bytes, Bytes)> = pairs
        .iter()
        .map(|(k, v)| {
            (
                Bytes::copy_from_slice(k.as_bytes()),
                Bytes::copy_from_slice(v.as_bytes()),
            )
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Counts how many tracked readers have been destroyed.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicUsize>);

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// In-memory iterator over sorted pairs.
#[derive(Debug, Clone)]
pub struct VecIterator {
    entries: Arc<Vec<(Bytes, Bytes)>>,
    pos: Option<usize>,
}

impl VecIterator {
    pub fn from_pairs(pairs: &[(&str, &str)]) -> Self {
        Self::from_entries(Arc::new(to_entries(pairs)))
    }

    fn from_entries(entries: Arc<Vec<(Bytes, Bytes)>>) -> Self {
        Self { entries, pos: None }
    }

    fn position(&mut self, idx: usize) {
        self.pos = (idx < self.entries.len()).then_some(idx);
    }
}

impl InternalIterator for VecIterator {
    fn valid(&self) -> bool {
        self.pos.is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.position(0);
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.pos = self.entries.len().checked_sub(1);
        Ok(())
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        let idx = self.entries.partition_point(|(k, _)| k.as_ref() < target);
        self.position(idx);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        let pos = self
            .pos
            .ok_or_else(|| Error::invalid_iterator_use("next() on an unpositioned iterator"))?;
        self.position(pos + 1);
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        let pos = self
            .pos
            .ok_or_else(|| Error::invalid_iterator_use("prev() on an unpositioned iterator"))?;
        self.pos = pos.checked_sub(1);
        Ok(())
    }

    fn key(&self) -> Option<&[u8]> {
        self.pos.map(|i| self.entries[i].0.as_ref())
    }

    fn value(&self) -> Option<&[u8]> {
        self.pos.map(|i| self.entries[i].1.as_ref())
    }
}

/// Table reader over in-memory pairs.
pub struct VecTableReader {
    file_number: u64,
    entries: Arc<Vec<(Bytes, Bytes)>>,
    properties: TableProperties,
    drops: Option<DropCounter>,
}

impl VecTableReader {
    fn new(file_number: u64, entries: Arc<Vec<(Bytes, Bytes)>>, drops: Option<DropCounter>) -> Self {
        let mut properties = TableProperties {
            num_entries: entries.len() as u64,
            num_data_blocks: u64::from(!entries.is_empty()),
            ..TableProperties::default()
        };
        for (key, value) in entries.iter() {
            properties.raw_key_size += key.len() as u64;
            properties.raw_value_size += value.len() as u64;
        }
        if let (Some(first), Some(last)) = (entries.first(), entries.last()) {
            properties.smallest_key = first.0.clone();
            properties.largest_key = last.0.clone();
        }

        Self {
            file_number,
            entries,
            properties,
            drops,
        }
    }
}

impl Drop for VecTableReader {
    fn drop(&mut self) {
        if let Some(drops) = &self.drops {
            drops.bump();
        }
    }
}

/// Iterator that keeps its reader alive.
struct VecTableIterator {
    _reader: Arc<VecTableReader>,
    inner: VecIterator,
}

impl InternalIterator for VecTableIterator {
    fn valid(&self) -> bool {
        self.inner.valid()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.inner.seek_to_first()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.inner.seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.inner.seek(target)
    }

    fn next(&mut self) -> Result<()> {
        self.inner.next()
    }

    fn prev(&mut self) -> Result<()> {
        self.inner.prev()
    }

    fn key(&self) -> Option<&[u8]> {
        self.inner.key()
    }

    fn value(&self) -> Option<&[u8]> {
        self.inner.value()
    }
}

impl TableReader for VecTableReader {
    fn file_number(&self) -> u64 {
        self.file_number
    }

    fn properties(&self) -> &TableProperties {
        &self.properties
    }

    fn get(&self, key: &[u8], _read_options: &ReadOptions) -> Result<Option<Bytes>> {
        Ok(self
            .entries
            .binary_search_by(|(k, _)| k.as_ref().cmp(key))
            .ok()
            .map(|i| self.entries[i].1.clone()))
    }

    fn new_iterator<'a>(
        self: Arc<Self>,
        _read_options: &ReadOptions,
        _arena: &'a ScanArena,
    ) -> Result<Box<dyn InternalIterator + 'a>> {
        let inner = VecIterator::from_entries(Arc::clone(&self.entries));
        Ok(Box::new(VecTableIterator {
            _reader: self,
            inner,
        }))
    }

    fn approximate_memory_usage(&self) -> usize {
        self.properties.approximate_memory_usage()
    }
}

struct TableFixture {
    entries: Arc<Vec<(Bytes, Bytes)>>,
    drops: Option<DropCounter>,
}

/// Opener serving in-memory tables, with knobs for failure injection.
#[derive(Default)]
pub struct MemoryOpener {
    tables: Mutex<HashMap<u64, TableFixture>>,
    open_counts: Mutex<HashMap<u64, usize>>,
    delay: Mutex<Option<Duration>>,
    panics: Mutex<HashSet<u64>>,
}

impl MemoryOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_table(&self, file_number: u64, pairs: &[(&str, &str)]) {
        self.insert(file_number, pairs, None);
    }

    pub fn add_tracked_table(&self, file_number: u64, pairs: &[(&str, &str)], drops: &DropCounter) {
        self.insert(file_number, pairs, Some(drops.clone()));
    }

    fn insert(&self, file_number: u64, pairs: &[(&str, &str)], drops: Option<DropCounter>) {
        let fixture = TableFixture {
            entries: Arc::new(to_entries(pairs)),
            drops,
        };
        self.tables.lock().insert(file_number, fixture);
    }

    /// Number of open attempts for `file_number`, failed ones included.
    pub fn open_count(&self, file_number: u64) -> usize {
        self.open_counts.lock().get(&file_number).copied().unwrap_or(0)
    }

    /// Sleep this long inside every open.
    pub fn set_open_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Make opens of `file_number` panic.
    pub fn panic_on_open(&self, file_number: u64) {
        self.panics.lock().insert(file_number);
    }
}

impl TableOpener for MemoryOpener {
    fn open(&self, _path: &Path, file_number: u64) -> Result<Arc<dyn TableReader>> {
        *self.open_counts.lock().entry(file_number).or_insert(0) += 1;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if self.panics.lock().contains(&file_number) {
            panic!("injected panic opening table {}", file_number);
        }

        let tables = self.tables.lock();
        let fixture = tables
            .get(&file_number)
            .ok_or_else(|| Error::NotFound(format!("table {:06}", file_number)))?;
        Ok(Arc::new(VecTableReader::new(
            file_number,
            Arc::clone(&fixture.entries),
            fixture.drops.clone(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_iterator_walks_sorted_pairs() {
        let mut iter = VecIterator::from_pairs(&[("b", "2"), ("a", "1")]);
        assert!(iter.next().is_err());

        iter.seek_to_first().unwrap();
        assert_eq!(iter.key(), Some(&b"a"[..]));
        iter.next().unwrap();
        assert_eq!(iter.value(), Some(&b"2"[..]));
        iter.next().unwrap();
        assert!(!iter.valid());
    }
}
