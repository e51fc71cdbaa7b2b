//! Table cache for opened table readers.
//!
//! Keeps a bounded set of opened [`TableReader`]s keyed by file number so
//! repeated scans do not re-open and re-parse table footers and indexes.
//!
//! Each entry is either opening (one caller is performing the open and the
//! others wait on it) or ready. Entries carry a reference count changed only
//! under their shard lock; only ready entries with no references are
//! eligible for eviction. Retiring an entry that is still referenced hides
//! it from lookups and postpones its destruction until the last reference
//! is released.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::arena::ScanArena;
use crate::iterator::ScopedIterator;
use crate::options::{Options, ReadOptions};
use crate::sstable::{TableOpener, TableProperties, TableReader};
use crate::util::filename::table_file_path;
use crate::{Error, Result};

use super::lru::IdleList;
use super::stats::CacheStats;

/// Outcome of an open shared with waiting callers.
enum OpenOutcome {
    Pending,
    Opened(Arc<dyn TableReader>),
    Failed(Error),
}

/// Rendezvous between the caller opening a table and callers waiting on it.
struct PendingOpen {
    outcome: Mutex<OpenOutcome>,
    cv: Condvar,
}

impl PendingOpen {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(OpenOutcome::Pending),
            cv: Condvar::new(),
        }
    }

    fn resolve(&self, outcome: OpenOutcome) {
        *self.outcome.lock() = outcome;
        self.cv.notify_all();
    }

    fn wait(&self) -> std::result::Result<Arc<dyn TableReader>, Error> {
        let mut outcome = self.outcome.lock();
        loop {
            match &*outcome {
                OpenOutcome::Pending => self.cv.wait(&mut outcome),
                OpenOutcome::Opened(reader) => return Ok(Arc::clone(reader)),
                OpenOutcome::Failed(err) => return Err(err.clone()),
            }
        }
    }
}

enum SlotState {
    Opening(Arc<PendingOpen>),
    Ready(Arc<dyn TableReader>),
}

struct Slot {
    state: SlotState,
    /// Outstanding handles, including those of callers waiting on an open.
    refs: usize,
    /// Hidden from lookups; destroyed when `refs` reaches zero.
    retired: bool,
}

/// Observable state of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Not cached.
    Absent,
    /// An open is in progress.
    Opening,
    /// Opened and available.
    Ready,
    /// Retired while referenced; destroyed on last release.
    Retired,
}

struct CacheShard {
    capacity: usize,
    slots: HashMap<u64, Slot>,
    /// Ready, unreferenced, unretired entries in LRU order.
    idle: IdleList<u64>,
}

impl CacheShard {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: HashMap::new(),
            idle: IdleList::new(),
        }
    }

    /// Drop idle entries, least recently used first, until within capacity.
    ///
    /// Referenced entries are never touched, so the shard may stay over
    /// capacity while everything in it is pinned.
    fn evict_idle(&mut self) -> Vec<(u64, Arc<dyn TableReader>)> {
        let mut evicted = Vec::new();
        while self.slots.len() > self.capacity {
            let Some(victim) = self.idle.pop_lru() else {
                break;
            };
            if let Some(Slot {
                state: SlotState::Ready(reader),
                ..
            }) = self.slots.remove(&victim)
            {
                evicted.push((victim, reader));
            }
        }
        evicted
    }
}

/// Who performs the open for a missing entry.
enum OpenRole {
    Leader(Arc<PendingOpen>),
    Waiter(Arc<PendingOpen>),
}

struct CacheInner {
    db_path: PathBuf,
    opener: Arc<dyn TableOpener>,
    shards: Vec<Mutex<CacheShard>>,
    capacity: usize,
    stats: Arc<CacheStats>,
}

impl CacheInner {
    fn shard(&self, file_number: u64) -> &Mutex<CacheShard> {
        &self.shards[(file_number as usize) & (self.shards.len() - 1)]
    }

    /// Drop one reference to `file_number`.
    fn release(&self, file_number: u64) {
        let (destroyed, evicted) = {
            let mut guard = self.shard(file_number).lock();
            let shard = &mut *guard;

            let Some(slot) = shard.slots.get_mut(&file_number) else {
                warn!(file_number, "release of a table that is not cached");
                return;
            };
            debug_assert!(slot.refs > 0, "table reference released twice");
            slot.refs = slot.refs.saturating_sub(1);

            if slot.refs > 0 {
                return;
            }

            if slot.retired {
                let destroyed = match shard.slots.remove(&file_number) {
                    Some(Slot {
                        state: SlotState::Ready(reader),
                        ..
                    }) => Some(reader),
                    _ => None,
                };
                (destroyed, Vec::new())
            } else {
                shard.idle.touch(file_number);
                (None, shard.evict_idle())
            }
        };

        if destroyed.is_some() {
            debug!(file_number, "destroying retired table reader after last release");
            CacheStats::record(&self.stats.destroyed);
        }
        self.destroy_evicted(evicted);
    }

    /// Account for readers removed by capacity eviction; dropped outside any lock.
    fn destroy_evicted(&self, evicted: Vec<(u64, Arc<dyn TableReader>)>) {
        CacheStats::record_n(&self.stats.evictions, evicted.len());
        CacheStats::record_n(&self.stats.destroyed, evicted.len());
        for (file_number, _reader) in evicted {
            debug!(file_number, "evicted idle table reader");
        }
    }
}

/// Reference to a cached table reader.
///
/// The reader stays alive and cached at least until the handle is dropped
/// or [`release`](Self::release)d.
pub struct TableHandle {
    cache: Arc<CacheInner>,
    file_number: u64,
    reader: Arc<dyn TableReader>,
}

impl TableHandle {
    /// The table's file number.
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// The opened reader.
    pub fn reader(&self) -> &Arc<dyn TableReader> {
        &self.reader
    }

    /// Give the reference back to the cache.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for TableHandle {
    fn drop(&mut self) {
        self.cache.release(self.file_number);
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("file_number", &self.file_number)
            .finish()
    }
}

/// Bounded, sharded cache of opened table readers.
///
/// Cloning is cheap and yields a handle to the same cache.
#[derive(Clone)]
pub struct TableCache {
    inner: Arc<CacheInner>,
}

impl TableCache {
    /// Create a table cache for the tables under `db_path`.
    ///
    /// Holds up to `options.max_open_files` idle readers, split across
    /// `2^options.table_cache_shard_bits` shards. The shard count is halved
    /// until every shard gets at least one reader.
    pub fn new(
        db_path: impl AsRef<Path>,
        opener: Arc<dyn TableOpener>,
        options: &Options,
    ) -> Self {
        let capacity = options.max_open_files.max(1);
        let mut num_shards = 1usize << options.table_cache_shard_bits;
        while num_shards > capacity {
            num_shards >>= 1;
        }
        let (base, extra) = (capacity / num_shards, capacity % num_shards);

        Self {
            inner: Arc::new(CacheInner {
                db_path: db_path.as_ref().to_path_buf(),
                opener,
                shards: (0..num_shards)
                    .map(|i| Mutex::new(CacheShard::new(base + usize::from(i < extra))))
                    .collect(),
                capacity,
                stats: Arc::new(CacheStats::new()),
            }),
        }
    }

    /// Get a handle to the reader for `file_number`, opening the table if needed.
    ///
    /// Concurrent callers for the same uncached table share a single open:
    /// one performs it, the rest wait. If that open fails, the caller that
    /// performed it gets [`Error::TableOpen`] and every waiter gets
    /// [`Error::OpenFailed`] carrying the same cause; the entry is removed
    /// so a later call can try again.
    pub fn get_reader(&self, file_number: u64) -> Result<TableHandle> {
        let role = {
            let mut guard = self.inner.shard(file_number).lock();
            let shard = &mut *guard;

            match shard.slots.get_mut(&file_number) {
                Some(slot) if slot.retired => return Err(Error::TableRetired(file_number)),
                Some(slot) => match &slot.state {
                    SlotState::Ready(reader) => {
                        let reader = Arc::clone(reader);
                        slot.refs += 1;
                        if slot.refs == 1 {
                            shard.idle.remove(&file_number);
                        }
                        CacheStats::record(&self.inner.stats.hits);
                        return Ok(self.handle(file_number, reader));
                    }
                    SlotState::Opening(pending) => {
                        slot.refs += 1;
                        OpenRole::Waiter(Arc::clone(pending))
                    }
                },
                None => {
                    let pending = Arc::new(PendingOpen::new());
                    shard.slots.insert(
                        file_number,
                        Slot {
                            state: SlotState::Opening(Arc::clone(&pending)),
                            refs: 1,
                            retired: false,
                        },
                    );
                    OpenRole::Leader(pending)
                }
            }
        };

        match role {
            OpenRole::Leader(pending) => self.lead_open(file_number, &pending),
            OpenRole::Waiter(pending) => self.wait_for_open(file_number, &pending),
        }
    }

    fn handle(&self, file_number: u64, reader: Arc<dyn TableReader>) -> TableHandle {
        TableHandle {
            cache: Arc::clone(&self.inner),
            file_number,
            reader,
        }
    }

    fn lead_open(&self, file_number: u64, pending: &PendingOpen) -> Result<TableHandle> {
        CacheStats::record(&self.inner.stats.misses);
        let path = table_file_path(&self.inner.db_path, file_number);
        debug!(file_number, path = %path.display(), "opening table");

        let opener = &self.inner.opener;
        match catch_unwind(AssertUnwindSafe(|| opener.open(&path, file_number))) {
            Ok(Ok(reader)) => self.install(file_number, pending, reader),
            Ok(Err(err)) => {
                let err = Error::table_open(file_number, err);
                warn!(file_number, error = %err, "table open failed");
                self.abandon(file_number, pending, err.clone());
                Err(err)
            }
            Err(payload) => {
                warn!(file_number, "table opener panicked");
                self.abandon(
                    file_number,
                    pending,
                    Error::table_open(file_number, Error::internal("table opener panicked")),
                );
                resume_unwind(payload)
            }
        }
    }

    fn install(
        &self,
        file_number: u64,
        pending: &PendingOpen,
        reader: Arc<dyn TableReader>,
    ) -> Result<TableHandle> {
        let evicted = {
            let mut guard = self.inner.shard(file_number).lock();
            let shard = &mut *guard;
            match shard.slots.get_mut(&file_number) {
                Some(slot) => {
                    slot.state = SlotState::Ready(Arc::clone(&reader));
                    Some(shard.evict_idle())
                }
                None => None,
            }
        };
        let Some(evicted) = evicted else {
            let err = Error::internal("opening table slot disappeared");
            pending.resolve(OpenOutcome::Failed(err.clone()));
            return Err(err);
        };

        pending.resolve(OpenOutcome::Opened(Arc::clone(&reader)));
        CacheStats::record(&self.inner.stats.opens);
        debug!(
            file_number,
            entries = reader.properties().num_entries,
            "opened table"
        );

        self.inner.destroy_evicted(evicted);
        Ok(self.handle(file_number, reader))
    }

    fn abandon(&self, file_number: u64, pending: &PendingOpen, err: Error) {
        self.inner.shard(file_number).lock().slots.remove(&file_number);
        pending.resolve(OpenOutcome::Failed(err));
        CacheStats::record(&self.inner.stats.open_failures);
    }

    fn wait_for_open(&self, file_number: u64, pending: &PendingOpen) -> Result<TableHandle> {
        CacheStats::record(&self.inner.stats.waits);
        trace!(file_number, "waiting for concurrent table open");

        match pending.wait() {
            Ok(reader) => Ok(self.handle(file_number, reader)),
            Err(err) => Err(Error::OpenFailed {
                file_number,
                source: Box::new(err),
            }),
        }
    }

    /// Create an iterator over `file_number` for one scan.
    ///
    /// The scan's `table_filter`, if any, is called exactly once with the
    /// table's properties. A rejected table yields an iterator over zero
    /// records and its reference is released at once; otherwise the table's
    /// iterator holds the reference until it ends.
    pub fn new_iterator<'a>(
        &self,
        file_number: u64,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
    ) -> Result<ScopedIterator<'a>> {
        match &read_options.table_filter {
            Some(filter) => self.new_iterator_with(file_number, read_options, arena, |props| {
                filter(props)
            }),
            None => self.new_iterator_with(file_number, read_options, arena, |_| true),
        }
    }

    /// Like [`new_iterator`](Self::new_iterator), with `admit` deciding
    /// whether the table takes part instead of the scan's `table_filter`.
    pub(crate) fn new_iterator_with<'a>(
        &self,
        file_number: u64,
        read_options: &ReadOptions,
        arena: &'a ScanArena,
        admit: impl FnOnce(&TableProperties) -> bool,
    ) -> Result<ScopedIterator<'a>> {
        let handle = self.get_reader(file_number)?;

        if !admit(handle.reader().properties()) {
            trace!(file_number, "table rejected by table filter");
            CacheStats::record(&self.inner.stats.tables_filtered);
            handle.release();
            return Ok(arena.empty_iterator());
        }

        let iter = Arc::clone(handle.reader()).new_iterator(read_options, arena)?;
        let mut scoped = arena.adopt(iter);
        scoped.register_cleanup(move || handle.release());
        Ok(scoped)
    }

    /// Retire `file_number`.
    ///
    /// An unreferenced reader is destroyed now. A referenced one is hidden
    /// from future lookups and destroyed when its last reference goes away.
    pub fn evict(&self, file_number: u64) {
        let destroyed = {
            let mut guard = self.inner.shard(file_number).lock();
            let shard = &mut *guard;
            match shard.slots.get_mut(&file_number) {
                None => None,
                Some(slot) if slot.refs == 0 => {
                    shard.idle.remove(&file_number);
                    shard.slots.remove(&file_number)
                }
                Some(slot) => {
                    if !slot.retired {
                        slot.retired = true;
                        CacheStats::record(&self.inner.stats.deferred_retirements);
                        debug!(file_number, refs = slot.refs, "deferring retirement of referenced table");
                    }
                    None
                }
            }
        };

        if destroyed.is_some() {
            debug!(file_number, "destroyed retired table reader");
            CacheStats::record(&self.inner.stats.destroyed);
        }
    }

    /// Drop every idle reader. Referenced and opening entries stay.
    pub fn clear(&self) {
        for shard in &self.inner.shards {
            let removed: Vec<Slot> = {
                let mut guard = shard.lock();
                let shard = &mut *guard;
                shard
                    .idle
                    .drain()
                    .into_iter()
                    .filter_map(|file_number| shard.slots.remove(&file_number))
                    .collect()
            };
            CacheStats::record_n(&self.inner.stats.destroyed, removed.len());
        }
    }

    /// Number of cached entries, opening and retired ones included.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|s| s.lock().slots.len()).sum()
    }

    /// Check if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured capacity in readers.
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// State of the entry for `file_number`.
    pub fn entry_state(&self, file_number: u64) -> EntryState {
        let shard = self.inner.shard(file_number).lock();
        match shard.slots.get(&file_number) {
            None => EntryState::Absent,
            Some(slot) if slot.retired => EntryState::Retired,
            Some(Slot {
                state: SlotState::Opening(_),
                ..
            }) => EntryState::Opening,
            Some(_) => EntryState::Ready,
        }
    }

    /// Outstanding references to `file_number` (0 when absent).
    pub fn ref_count(&self, file_number: u64) -> usize {
        let shard = self.inner.shard(file_number).lock();
        shard.slots.get(&file_number).map_or(0, |slot| slot.refs)
    }

    /// Cache statistics.
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.inner.stats)
    }
}

impl fmt::Debug for TableCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableCache")
            .field("db_path", &self.inner.db_path)
            .field("capacity", &self.inner.capacity)
            .field("shards", &self.inner.shards.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::InternalIterator;
    use crate::testutil::{single_shard_options, DropCounter, MemoryOpener};
    use std::sync::atomic::Ordering;
    use std::sync::Barrier;
    use std::thread;

    fn cache_with(opener: &Arc<MemoryOpener>, capacity: usize) -> TableCache {
        let options = single_shard_options(capacity);
        TableCache::new("/unused", Arc::clone(opener) as Arc<dyn TableOpener>, &options)
    }

    #[test]
    fn test_hit_after_first_open() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(1, &[("a", "1")]);
        let cache = cache_with(&opener, 4);

        let first = cache.get_reader(1).unwrap();
        let second = cache.get_reader(1).unwrap();
        assert!(Arc::ptr_eq(first.reader(), second.reader()));
        assert_eq!(opener.open_count(1), 1);
        assert_eq!(cache.ref_count(1), 2);

        let stats = cache.stats();
        assert_eq!(stats.hits.load(Ordering::Relaxed), 1);
        assert_eq!(stats.misses.load(Ordering::Relaxed), 1);

        drop(first);
        second.release();
        assert_eq!(cache.ref_count(1), 0);
        assert_eq!(cache.entry_state(1), EntryState::Ready);
    }

    #[test]
    fn test_open_failure_is_not_cached() {
        let opener = Arc::new(MemoryOpener::new());
        let cache = cache_with(&opener, 4);

        let err = cache.get_reader(7).unwrap_err();
        assert!(matches!(err, Error::TableOpen { file_number: 7, .. }));
        assert_eq!(cache.entry_state(7), EntryState::Absent);

        // A later call retries the open.
        opener.add_table(7, &[("k", "v")]);
        let handle = cache.get_reader(7).unwrap();
        assert_eq!(handle.reader().properties().num_entries, 1);
        assert_eq!(opener.open_count(7), 2);
    }

    #[test]
    fn test_evicts_idle_lru_first() {
        let opener = Arc::new(MemoryOpener::new());
        for id in 1..=3 {
            opener.add_table(id, &[("k", "v")]);
        }
        let cache = cache_with(&opener, 2);

        cache.get_reader(1).unwrap().release();
        cache.get_reader(2).unwrap().release();
        // Touch 1 so 2 becomes least recently used.
        cache.get_reader(1).unwrap().release();
        cache.get_reader(3).unwrap().release();

        assert_eq!(cache.entry_state(1), EntryState::Ready);
        assert_eq!(cache.entry_state(2), EntryState::Absent);
        assert_eq!(cache.entry_state(3), EntryState::Ready);
        assert_eq!(cache.stats().evictions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_pinned_entries_are_never_evicted() {
        let opener = Arc::new(MemoryOpener::new());
        let drops = DropCounter::new();
        for id in 1..=3 {
            opener.add_tracked_table(id, &[("k", "v")], &drops);
        }
        let cache = cache_with(&opener, 1);

        let pinned = cache.get_reader(1).unwrap();
        let other = cache.get_reader(2).unwrap();
        let third = cache.get_reader(3).unwrap();

        // Over capacity, but nothing is idle.
        assert_eq!(cache.len(), 3);
        assert_eq!(drops.count(), 0);

        drop(third);
        drop(other);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.entry_state(1), EntryState::Ready);
        assert_eq!(pinned.reader().properties().num_entries, 1);
        drop(pinned);
    }

    #[test]
    fn test_retire_pinned_table_defers_destruction() {
        let opener = Arc::new(MemoryOpener::new());
        let drops = DropCounter::new();
        opener.add_tracked_table(5, &[("a", "1"), ("b", "2")], &drops);
        let cache = cache_with(&opener, 4);

        let arena = ScanArena::new();
        let mut iter = cache
            .new_iterator(5, &ReadOptions::default(), &arena)
            .unwrap();

        cache.evict(5);
        assert_eq!(cache.entry_state(5), EntryState::Retired);
        assert!(matches!(cache.get_reader(5), Err(Error::TableRetired(5))));
        assert_eq!(drops.count(), 0);

        iter.seek_to_first().unwrap();
        assert_eq!(iter.key(), Some(&b"a"[..]));
        iter.next().unwrap();
        assert_eq!(iter.value(), Some(&b"2"[..]));

        drop(iter);
        assert_eq!(drops.count(), 1);
        assert_eq!(cache.entry_state(5), EntryState::Absent);
        assert_eq!(cache.stats().deferred_retirements.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_retire_idle_table_destroys_now() {
        let opener = Arc::new(MemoryOpener::new());
        let drops = DropCounter::new();
        opener.add_tracked_table(5, &[("a", "1")], &drops);
        let cache = cache_with(&opener, 4);

        cache.get_reader(5).unwrap().release();
        cache.evict(5);
        assert_eq!(drops.count(), 1);
        assert!(cache.is_empty());

        // Retiring an unknown table is a no-op.
        cache.evict(99);
    }

    #[test]
    fn test_filter_rejection_releases_reference() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(1, &[("a", "1"), ("b", "2")]);
        let cache = cache_with(&opener, 4);

        let read_options = ReadOptions::default().with_table_filter(|p| p.num_entries != 2);
        let arena = ScanArena::new();
        let mut iter = cache.new_iterator(1, &read_options, &arena).unwrap();

        assert_eq!(cache.ref_count(1), 0);
        iter.seek_to_first().unwrap();
        assert!(!iter.valid());
        assert_eq!(cache.stats().tables_filtered.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_iterator_holds_reference_until_dropped() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(1, &[("a", "1")]);
        let cache = cache_with(&opener, 4);

        let arena = ScanArena::new();
        let before = cache.ref_count(1);
        let iter = cache
            .new_iterator(1, &ReadOptions::default(), &arena)
            .unwrap();
        assert_eq!(cache.ref_count(1), before + 1);
        assert_eq!(arena.live_iterators(), 1);

        iter.release();
        assert_eq!(cache.ref_count(1), before);
        assert_eq!(arena.live_iterators(), 0);
    }

    #[test]
    fn test_concurrent_lookups_share_one_open() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(3, &[("a", "1")]);
        opener.set_open_delay(std::time::Duration::from_millis(20));
        let cache = cache_with(&opener, 4);

        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));
        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let cache = cache.clone();
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get_reader(3).map(|h| h.file_number())
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap().unwrap(), 3);
        }
        assert_eq!(opener.open_count(3), 1);
        assert_eq!(cache.ref_count(3), 0);
    }

    #[test]
    fn test_concurrent_lookups_share_one_failure() {
        let opener = Arc::new(MemoryOpener::new());
        opener.set_open_delay(std::time::Duration::from_millis(200));
        let cache = cache_with(&opener, 4);

        let leader = {
            let cache = cache.clone();
            thread::spawn(move || cache.get_reader(5).map(|h| h.file_number()))
        };
        while cache.entry_state(5) != EntryState::Opening {
            thread::yield_now();
        }

        let waiters = 6;
        let handles: Vec<_> = (0..waiters)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get_reader(5).map(|h| h.file_number()))
            })
            .collect();

        let leader_err = leader.join().unwrap().unwrap_err();
        assert!(matches!(leader_err, Error::TableOpen { file_number: 5, .. }));

        for handle in handles {
            match handle.join().unwrap().unwrap_err() {
                Error::OpenFailed {
                    file_number,
                    source,
                } => {
                    assert_eq!(file_number, 5);
                    assert_eq!(source.to_string(), leader_err.to_string());
                }
                other => panic!("unexpected error: {:?}", other),
            }
        }

        assert_eq!(opener.open_count(5), 1);
        assert_eq!(cache.entry_state(5), EntryState::Absent);
        assert_eq!(cache.ref_count(5), 0);
        let stats = cache.stats().snapshot();
        assert_eq!(stats.waits, waiters as u64);
        assert_eq!(stats.open_failures, 1);
    }

    #[test]
    fn test_opener_panic_does_not_strand_slot() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(4, &[("a", "1")]);
        opener.panic_on_open(4);
        let cache = cache_with(&opener, 4);

        let result = catch_unwind(AssertUnwindSafe(|| cache.get_reader(4)));
        assert!(result.is_err());
        assert_eq!(cache.entry_state(4), EntryState::Absent);
        assert_eq!(cache.stats().open_failures.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_capacity_holds_with_more_shards_than_readers() {
        let opener = Arc::new(MemoryOpener::new());
        for id in 1..=16 {
            opener.add_table(id, &[("k", "v")]);
        }
        let options = Options {
            max_open_files: 3,
            table_cache_shard_bits: 4,
            ..Options::default()
        };
        let cache = TableCache::new("/unused", Arc::clone(&opener) as Arc<dyn TableOpener>, &options);
        assert_eq!(cache.inner.shards.len(), 2);

        for id in 1..=16 {
            drop(cache.get_reader(id).unwrap());
            assert!(cache.len() <= cache.capacity());
        }
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_clear_keeps_referenced_entries() {
        let opener = Arc::new(MemoryOpener::new());
        opener.add_table(1, &[("a", "1")]);
        opener.add_table(2, &[("b", "1")]);
        let cache = cache_with(&opener, 4);

        let held = cache.get_reader(1).unwrap();
        cache.get_reader(2).unwrap().release();

        cache.clear();
        assert_eq!(cache.entry_state(1), EntryState::Ready);
        assert_eq!(cache.entry_state(2), EntryState::Absent);
        drop(held);
        assert_eq!(cache.capacity(), 4);
    }
}
