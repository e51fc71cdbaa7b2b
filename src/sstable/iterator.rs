//! SSTable iterator for efficient range scans.
//!
//! Provides two-level iteration: index block → data blocks.

use std::sync::Arc;

use crate::arena::ScanArena;
use crate::iterator::InternalIterator;
use crate::{Error, Result};

use super::block::{BlockHandle, BlockIterator};
use super::reader::{decode_index_value, SSTableReader};
use super::TableReader;

/// Iterator over an SSTable.
///
/// The index block points to data blocks, which are read lazily as the
/// iterator moves onto them. Raw block reads borrow scratch memory from the
/// scan's arena. The iterator keeps its reader alive.
pub struct SSTableIterator<'a> {
    /// The table being iterated.
    reader: Arc<SSTableReader>,
    /// Scratch memory for block reads.
    arena: &'a ScanArena,
    /// Verify data block checksums.
    verify_checksums: bool,
    /// Index block iterator.
    index_iter: BlockIterator,
    /// Current data block iterator.
    data_iter: Option<BlockIterator>,
    /// Handle of the block behind `data_iter`.
    data_handle: Option<BlockHandle>,
}

impl<'a> SSTableIterator<'a> {
    /// Create a new, unpositioned SSTable iterator.
    pub fn new(reader: Arc<SSTableReader>, verify_checksums: bool, arena: &'a ScanArena) -> Self {
        let index_iter = reader.index_block().iter();
        Self {
            reader,
            arena,
            verify_checksums,
            index_iter,
            data_iter: None,
            data_handle: None,
        }
    }

    /// Point `data_iter` at the block of the current index entry.
    ///
    /// Keeps the loaded block when the index entry refers to it already.
    fn init_data_block(&mut self) -> Result<()> {
        if !self.index_iter.valid() {
            if self.index_iter.is_corrupted() {
                return Err(self.fail("malformed index block entry"));
            }
            self.data_iter = None;
            self.data_handle = None;
            return Ok(());
        }

        let handle = match decode_index_value(self.index_iter.value()) {
            Ok(handle) => handle,
            Err(err) => {
                self.data_iter = None;
                return Err(err);
            }
        };
        if self.data_handle == Some(handle) && self.data_iter.is_some() {
            return Ok(());
        }

        let reader = &self.reader;
        let verify = self.verify_checksums;
        match self
            .arena
            .with_scratch(|scratch| reader.read_block(&handle, verify, scratch))
        {
            Ok(block) => {
                self.data_iter = Some(block.iter());
                self.data_handle = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.data_iter = None;
                self.data_handle = None;
                Err(err)
            }
        }
    }

    /// Move forward past exhausted data blocks.
    fn skip_empty_blocks_forward(&mut self) -> Result<()> {
        loop {
            let corrupted = match &self.data_iter {
                Some(iter) if iter.valid() => return Ok(()),
                Some(iter) => iter.is_corrupted(),
                None => return Ok(()),
            };
            if corrupted {
                return Err(self.fail("malformed data block entry"));
            }

            self.index_iter.next();
            self.init_data_block()?;
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_first();
            }
        }
    }

    /// Move backward past exhausted data blocks.
    fn skip_empty_blocks_backward(&mut self) -> Result<()> {
        loop {
            let corrupted = match &self.data_iter {
                Some(iter) if iter.valid() => return Ok(()),
                Some(iter) => iter.is_corrupted(),
                None => return Ok(()),
            };
            if corrupted {
                return Err(self.fail("malformed data block entry"));
            }

            self.index_iter.prev();
            self.init_data_block()?;
            if let Some(iter) = self.data_iter.as_mut() {
                iter.seek_to_last();
            }
        }
    }

    fn fail(&mut self, msg: &str) -> Error {
        self.data_iter = None;
        self.data_handle = None;
        Error::corruption(format!("table {:06}: {}", self.reader.file_number(), msg))
    }

    fn current(&self) -> Option<&BlockIterator> {
        self.data_iter.as_ref().filter(|iter| iter.valid())
    }
}

impl InternalIterator for SSTableIterator<'_> {
    fn valid(&self) -> bool {
        self.current().is_some()
    }

    fn seek_to_first(&mut self) -> Result<()> {
        self.index_iter.seek_to_first();
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_first();
        }
        self.skip_empty_blocks_forward()
    }

    fn seek_to_last(&mut self) -> Result<()> {
        self.index_iter.seek_to_last();
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek_to_last();
        }
        self.skip_empty_blocks_backward()
    }

    fn seek(&mut self, target: &[u8]) -> Result<()> {
        self.index_iter.seek(target);
        self.init_data_block()?;
        if let Some(iter) = self.data_iter.as_mut() {
            iter.seek(target);
        }
        self.skip_empty_blocks_forward()
    }

    fn next(&mut self) -> Result<()> {
        match self.data_iter.as_mut() {
            Some(iter) if iter.valid() => iter.next(),
            _ => {
                return Err(Error::invalid_iterator_use(
                    "next() on an unpositioned table iterator",
                ))
            }
        }
        self.skip_empty_blocks_forward()
    }

    fn prev(&mut self) -> Result<()> {
        match self.data_iter.as_mut() {
            Some(iter) if iter.valid() => iter.prev(),
            _ => {
                return Err(Error::invalid_iterator_use(
                    "prev() on an unpositioned table iterator",
                ))
            }
        }
        self.skip_empty_blocks_backward()
    }

    fn key(&self) -> Option<&[u8]> {
        self.current().map(|iter| iter.key())
    }

    fn value(&self) -> Option<&[u8]> {
        self.current().map(|iter| iter.value().as_ref())
    }
}
