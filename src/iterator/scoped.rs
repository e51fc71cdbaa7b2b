//! Iterator bundled with its cleanup chain.

use std::fmt;

use crate::Result;

use super::{CleanupChain, InternalIterator};

/// An iterator handed out for one table of a scan.
///
/// Owns the table iterator and the chain of actions releasing what the
/// iterator depends on (its arena slot, its table cache reference). When
/// the scoped iterator ends, the inner iterator is dropped first and the
/// chain runs after it, so nothing is released while still in use.
pub struct ScopedIterator<'a> {
    // Field order matters: `inner` drops before `cleanup` runs.
    inner: Box<dyn InternalIterator + 'a>,
    cleanup: CleanupChain<'a>,
}

impl<'a> ScopedIterator<'a> {
    /// Wrap an iterator with an empty cleanup chain.
    pub fn new(inner: Box<dyn InternalIterator + 'a>) -> Self {
        Self {
            inner,
            cleanup: CleanupChain::new(),
        }
    }

    /// Register an action to run when this iterator ends.
    pub fn register_cleanup<F>(&mut self, action: F)
    where
        F: FnOnce() + 'a,
    {
        self.cleanup.register(action);
    }

    /// Number of release actions still pending.
    pub fn pending_cleanups(&self) -> usize {
        self.cleanup.len()
    }

    /// End the iterator now, running its cleanup chain.
    pub fn release(self) {
        drop(self);
    }
}

impl InternalIterator for ScopedIterator<'_> {
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

impl fmt::Debug for ScopedIterator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedIterator")
            .field("valid", &self.inner.valid())
            .field("cleanup", &self.cleanup)
            .finish()
    }
}
