//! Merge iterator for combining multiple sorted iterators.
//!
//! The merge iterator maintains a min-heap of child iterators and returns
//! entries in key order. When several children hold the same key, the
//! child with the lower index (newer data) comes first.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use bytes::Bytes;

use crate::Result;

use super::InternalIterator;

/// A single entry from a child iterator.
#[derive(Debug, Clone)]
pub struct MergeEntry {
    /// The key.
    pub key: Bytes,
    /// The value.
    pub value: Bytes,
    /// Index of the child this entry came from.
    pub iterator_index: usize,
}

impl MergeEntry {
    /// Create a new merge entry.
    pub fn new(key: Bytes, value: Bytes, iterator_index: usize) -> Self {
        Self {
            key,
            value,
            iterator_index,
        }
    }
}

impl PartialEq for MergeEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.iterator_index == other.iterator_index
    }
}

impl Eq for MergeEntry {}

impl PartialOrd for MergeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed for the max-heap: smaller keys first, then lower indexes.
        other
            .key
            .cmp(&self.key)
            .then_with(|| other.iterator_index.cmp(&self.iterator_index))
    }
}

/// Snapshot the current entry of `iter`, if any.
fn current_entry<I: InternalIterator>(iter: &I, index: usize) -> Option<MergeEntry> {
    if !iter.valid() {
        return None;
    }
    Some(MergeEntry::new(
        Bytes::copy_from_slice(iter.key()?),
        Bytes::copy_from_slice(iter.value()?),
        index,
    ))
}

/// Forward merge over sorted child iterators.
///
/// Children that are never valid (such as [`EmptyIterator`](super::EmptyIterator))
/// simply never contribute to the heap.
pub struct MergeIterator<I: InternalIterator> {
    /// Child iterators, newest data first.
    children: Vec<I>,
    /// Min-heap of the children's current entries.
    heap: BinaryHeap<MergeEntry>,
    /// Current entry.
    current: Option<MergeEntry>,
}

impl<I: InternalIterator> MergeIterator<I> {
    /// Create a new merge iterator. Unpositioned until a seek.
    pub fn new(children: Vec<I>) -> Self {
        Self {
            children,
            heap: BinaryHeap::new(),
            current: None,
        }
    }

    /// Number of child iterators.
    pub fn num_children(&self) -> usize {
        self.children.len()
    }

    /// Seek every child to its first entry.
    pub fn seek_to_first(&mut self) -> Result<()> {
        self.reposition(|child| child.seek_to_first())
    }

    /// Seek every child to the first entry with key >= `target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.reposition(|child| child.seek(target))
    }

    fn reposition<F>(&mut self, mut position: F) -> Result<()>
    where
        F: FnMut(&mut I) -> Result<()>,
    {
        self.heap.clear();
        self.current = None;

        for (index, child) in self.children.iter_mut().enumerate() {
            position(child)?;
            if let Some(entry) = current_entry(child, index) {
                self.heap.push(entry);
            }
        }

        self.current = self.heap.pop();
        Ok(())
    }

    /// Check if the iterator is valid.
    pub fn valid(&self) -> bool {
        self.current.is_some()
    }

    /// Get the current entry.
    pub fn current(&self) -> Option<&MergeEntry> {
        self.current.as_ref()
    }

    /// Get the current key.
    pub fn key(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.key.as_ref())
    }

    /// Get the current value.
    pub fn value(&self) -> Option<&[u8]> {
        self.current.as_ref().map(|e| e.value.as_ref())
    }

    /// Move to the next entry.
    pub fn next(&mut self) -> Result<()> {
        if let Some(entry) = self.current.take() {
            let index = entry.iterator_index;
            let child = &mut self.children[index];
            child.next()?;
            if let Some(next) = current_entry(child, index) {
                self.heap.push(next);
            }
        }

        self.current = self.heap.pop();
        Ok(())
    }
}

/// Merge iterator that yields each key once, from the newest child holding it.
pub struct DedupMergeIterator<I: InternalIterator> {
    inner: MergeIterator<I>,
}

impl<I: InternalIterator> DedupMergeIterator<I> {
    /// Create a new deduplicating merge iterator.
    pub fn new(children: Vec<I>) -> Self {
        Self {
            inner: MergeIterator::new(children),
        }
    }

    /// Number of child iterators.
    pub fn num_children(&self) -> usize {
        self.inner.num_children()
    }

    /// Seek to the first entry.
    pub fn seek_to_first(&mut self) -> Result<()> {
        self.inner.seek_to_first()
    }

    /// Seek to the first entry with key >= `target`.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.inner.seek(target)
    }

    /// Check if the iterator is valid.
    pub fn valid(&self) -> bool {
        self.inner.valid()
    }

    /// Get the current entry.
    pub fn current(&self) -> Option<&MergeEntry> {
        self.inner.current()
    }

    /// Get the current key.
    pub fn key(&self) -> Option<&[u8]> {
        self.inner.key()
    }

    /// Get the current value.
    pub fn value(&self) -> Option<&[u8]> {
        self.inner.value()
    }

    /// Move to the next distinct key, skipping older copies of the current one.
    pub fn next(&mut self) -> Result<()> {
        let last = match self.inner.current() {
            Some(entry) => entry.key.clone(),
            None => return Ok(()),
        };

        loop {
            self.inner.next()?;
            match self.inner.key() {
                Some(key) if key == last.as_ref() => continue,
                _ => return Ok(()),
            }
        }
    }
}
