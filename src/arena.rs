//! Per-scan arena.
//!
//! A [`ScanArena`] lives exactly as long as one scan. Every iterator handed
//! out for the scan borrows it, so no iterator can outlive the scan that
//! created it, and the scratch buffers used for block reads are freed
//! together when the arena is dropped.

use std::cell::{Cell, RefCell};

use crate::iterator::{EmptyIterator, InternalIterator, ScopedIterator};

/// Scoped memory region for one scan.
///
/// Not `Sync`: a scan and its iterators are owned by a single thread.
#[derive(Debug, Default)]
pub struct ScanArena {
    /// Reusable I/O buffers.
    scratch: RefCell<Vec<Vec<u8>>>,
    /// Bytes allocated for scratch buffers so far.
    allocated_bytes: Cell<usize>,
    /// Iterators adopted since creation.
    iterators_created: Cell<usize>,
    /// Iterators adopted and not yet released.
    live_iterators: Cell<usize>,
}

impl ScanArena {
    /// Create an empty arena.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an iterator for the duration of the scan.
    ///
    /// The returned iterator's cleanup chain starts with the release of its
    /// arena slot, so it runs last.
    pub fn adopt<'a>(&'a self, iter: Box<dyn InternalIterator + 'a>) -> ScopedIterator<'a> {
        self.iterators_created.set(self.iterators_created.get() + 1);
        self.live_iterators.set(self.live_iterators.get() + 1);

        let mut scoped = ScopedIterator::new(iter);
        scoped.register_cleanup(move || {
            self.live_iterators.set(self.live_iterators.get() - 1);
        });
        scoped
    }

    /// An iterator over zero records, allocated like any other.
    pub fn empty_iterator(&self) -> ScopedIterator<'_> {
        self.adopt(Box::new(EmptyIterator))
    }

    /// Run `f` with a cleared scratch buffer borrowed from the arena.
    ///
    /// The buffer goes back to the pool afterwards, keeping its capacity.
    pub fn with_scratch<R>(&self, f: impl FnOnce(&mut Vec<u8>) -> R) -> R {
        let mut buf = self.scratch.borrow_mut().pop().unwrap_or_default();
        buf.clear();
        let before = buf.capacity();

        let result = f(&mut buf);

        let grown = buf.capacity().saturating_sub(before);
        self.allocated_bytes.set(self.allocated_bytes.get() + grown);
        self.scratch.borrow_mut().push(buf);
        result
    }

    /// Bytes allocated for scratch buffers.
    pub fn memory_usage(&self) -> usize {
        self.allocated_bytes.get()
    }

    /// Number of iterators adopted so far.
    pub fn iterators_created(&self) -> usize {
        self.iterators_created.get()
    }

    /// Number of adopted iterators still alive.
    pub fn live_iterators(&self) -> usize {
        self.live_iterators.get()
    }
}
