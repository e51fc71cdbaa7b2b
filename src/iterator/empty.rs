//! Iterator over zero records.

use crate::Result;

use super::InternalIterator;

/// Stands in for a table that contributes nothing to a scan.
///
/// Never valid; every positioning call succeeds and does nothing, so merge
/// code treats it exactly like an exhausted table iterator.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyIterator;

impl InternalIterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn seek_to_first(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek_to_last(&mut self) -> Result<()> {
        Ok(())
    }

    fn seek(&mut self, _target: &[u8]) -> Result<()> {
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        Ok(())
    }

    fn prev(&mut self) -> Result<()> {
        Ok(())
    }

    fn key(&self) -> Option<&[u8]> {
        None
    }

    fn value(&self) -> Option<&[u8]> {
        None
    }
}
