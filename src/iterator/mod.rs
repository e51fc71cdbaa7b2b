//! Iterators for range scans.
//!
//! Every iterator handed out by the read path implements
//! [`InternalIterator`]:
//! - `SSTableIterator`: records of one table
//! - [`EmptyIterator`]: a table that contributes nothing to a scan
//! - [`ScopedIterator`]: either of the above plus its cleanup chain
//! - [`ScanIterator`]: the merged, bounded view over a whole version

mod cleanup;
mod empty;
mod merge;
mod scan;
mod scoped;

pub use cleanup::CleanupChain;
pub use empty::EmptyIterator;
pub use merge::{DedupMergeIterator, MergeIterator};
pub use scan::ScanIterator;
pub use scoped::ScopedIterator;

use crate::Result;

/// A positionable cursor over records in key order.
///
/// Positioning methods report I/O and corruption through their `Result`;
/// after an error the iterator is not valid. `key` and `value` return
/// `None` whenever the iterator is not valid.
pub trait InternalIterator {
    /// Whether the iterator is positioned at a record.
    fn valid(&self) -> bool;

    /// Position at the first record.
    fn seek_to_first(&mut self) -> Result<()>;

    /// Position at the last record.
    fn seek_to_last(&mut self) -> Result<()>;

    /// Position at the first record with key >= `target`.
    fn seek(&mut self, target: &[u8]) -> Result<()>;

    /// Advance to the next record.
    fn next(&mut self) -> Result<()>;

    /// Step back to the previous record.
    fn prev(&mut self) -> Result<()>;

    /// Key of the current record.
    fn key(&self) -> Option<&[u8]>;

    /// Value of the current record.
    fn value(&self) -> Option<&[u8]>;
}

impl<I: InternalIterator + ?Sized> InternalIterator for Box<I> {
    fn valid(&self) -> bool {
        (**self).valid()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        (**self).seek_to_first()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        (**self).seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        (**self).seek(target)
    }

    fn next(&mut self) -> Result<()> {
        (**self).next()
    }

    fn prev(&mut self) -> Result<()> {
        (**self).prev()
    }

    fn key(&self) -> Option<&[u8]> {
        (**self).key()
    }

    fn value(&self) -> Option<&[u8]> {
        (**self).value()
    }
}
