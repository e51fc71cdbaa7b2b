//! Merged, bounded iterator over every table of a version.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::version::Version;
use crate::Result;

use super::{DedupMergeIterator, ScopedIterator};

/// Iterator returned by [`TableStore::scan`](crate::TableStore::scan).
///
/// Merges one [`ScopedIterator`] per relevant table, newest table first, so
/// each key appears once with its newest value. Keys are restricted to
/// `[lower_bound, upper_bound)`. The version the scan started from stays
/// pinned until the iterator is dropped, and dropping it releases every
/// table reference the scan acquired.
pub struct ScanIterator<'a> {
    merge: DedupMergeIterator<ScopedIterator<'a>>,
    lower_bound: Option<Bytes>,
    upper_bound: Option<Bytes>,
    _version: Arc<Version>,
}

impl<'a> ScanIterator<'a> {
    pub(crate) fn new(
        version: Arc<Version>,
        children: Vec<ScopedIterator<'a>>,
        lower_bound: Option<Bytes>,
        upper_bound: Option<Bytes>,
    ) -> Self {
        Self {
            merge: DedupMergeIterator::new(children),
            lower_bound,
            upper_bound,
            _version: version,
        }
    }

    /// Number of per-table iterators, rejected tables included.
    pub fn num_tables(&self) -> usize {
        self.merge.num_children()
    }

    /// Whether the iterator is positioned at a record within bounds.
    pub fn valid(&self) -> bool {
        match (self.merge.key(), &self.upper_bound) {
            (Some(key), Some(upper)) => key < upper.as_ref(),
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Current key.
    pub fn key(&self) -> Option<&[u8]> {
        if self.valid() {
            self.merge.key()
        } else {
            None
        }
    }

    /// Current value.
    pub fn value(&self) -> Option<&[u8]> {
        if self.valid() {
            self.merge.value()
        } else {
            None
        }
    }

    /// Position at the first record within bounds.
    pub fn seek_to_first(&mut self) -> Result<()> {
        match self.lower_bound.clone() {
            Some(lower) => self.merge.seek(&lower),
            None => self.merge.seek_to_first(),
        }
    }

    /// Position at the first record with key >= `target`, clamped to the lower bound.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        match self.lower_bound.clone() {
            Some(lower) if target < lower.as_ref() => self.merge.seek(&lower),
            _ => self.merge.seek(target),
        }
    }

    /// Advance to the next distinct key.
    pub fn next(&mut self) -> Result<()> {
        if !self.valid() {
            return Ok(());
        }
        self.merge.next()
    }

    /// Read every record in bounds, from the start.
    pub fn collect_entries(&mut self) -> Result<Vec<(Bytes, Bytes)>> {
        let mut entries = Vec::new();
        self.seek_to_first()?;
        while self.valid() {
            if let Some(entry) = self.merge.current() {
                entries.push((entry.key.clone(), entry.value.clone()));
            }
            self.next()?;
        }
        Ok(entries)
    }
}

impl fmt::Debug for ScanIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanIterator")
            .field("num_tables", &self.num_tables())
            .field("valid", &self.valid())
            .field("lower_bound", &self.lower_bound)
            .field("upper_bound", &self.upper_bound)
            .finish()
    }
}
