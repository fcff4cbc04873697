//! Two-level iteration: an index cursor composed with per-block cursors.

use bytes::Bytes;

use crate::{Error, Result};

use super::block::BlockIter;

/// Flat cursor over every entry of a table.
///
/// The first level walks the index block, whose values are encoded block
/// handles; the second level walks the data block each handle locates.
/// Materializing a data block costs I/O, decompression, and decoding, so the
/// current block is reused for every move that stays inside it and rebuilt
/// only when the index cursor lands on a different handle.
pub struct TwoLevelIterator<F> {
    /// Turns the index entry's handle bytes into a data block cursor.
    block_function: F,
    index_iter: BlockIter,
    data_iter: Option<BlockIter>,
    /// Handle bytes that produced `data_iter`, for short-circuit reuse.
    data_block_handle: Vec<u8>,
    /// First error from building or discarding a data block. Sticky.
    status: Option<Error>,
}

impl<F> TwoLevelIterator<F>
where
    F: FnMut(&[u8]) -> Result<BlockIter>,
{
    /// Create an iterator over `index_iter`, materializing data blocks with
    /// `block_function`. The cursor starts invalid.
    pub fn new(index_iter: BlockIter, block_function: F) -> Self {
        Self {
            block_function,
            index_iter,
            data_iter: None,
            data_block_handle: Vec::new(),
            status: None,
        }
    }

    /// Check if the cursor is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.data_iter.as_ref().map_or(false, |it| it.valid())
    }

    /// Get the current key.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid());
        self.data_iter.as_ref().map_or(&[], |it| it.key())
    }

    /// Get the current value.
    pub fn value(&self) -> &Bytes {
        debug_assert!(self.valid());
        static EMPTY: Bytes = Bytes::new();
        self.data_iter.as_ref().map_or(&EMPTY, |it| it.value())
    }

    /// Get the first error from either level, if any.
    pub fn status(&self) -> Result<()> {
        self.index_iter.status()?;
        if let Some(it) = &self.data_iter {
            it.status()?;
        }
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Position at the first entry with key >= `target`.
    pub fn seek(&mut self, target: &[u8]) {
        self.index_iter.seek(target);
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek(target);
        }
        self.skip_empty_data_blocks_forward();
    }

    /// Position at the first entry of the table.
    pub fn seek_to_first(&mut self) {
        self.index_iter.seek_to_first();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_first();
        }
        self.skip_empty_data_blocks_forward();
    }

    /// Position at the last entry of the table.
    pub fn seek_to_last(&mut self) {
        self.index_iter.seek_to_last();
        self.init_data_block();
        if let Some(it) = &mut self.data_iter {
            it.seek_to_last();
        }
        self.skip_empty_data_blocks_backward();
    }

    /// Advance to the next entry.
    pub fn next(&mut self) {
        debug_assert!(self.valid());
        if let Some(it) = &mut self.data_iter {
            it.next();
        }
        self.skip_empty_data_blocks_forward();
    }

    /// Step back to the previous entry.
    pub fn prev(&mut self) {
        debug_assert!(self.valid());
        if let Some(it) = &mut self.data_iter {
            it.prev();
        }
        self.skip_empty_data_blocks_backward();
    }

    fn skip_empty_data_blocks_forward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.next();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_first();
            }
        }
    }

    fn skip_empty_data_blocks_backward(&mut self) {
        while self.data_iter.as_ref().map_or(true, |it| !it.valid()) {
            if !self.index_iter.valid() {
                self.set_data_iter(None);
                return;
            }
            self.index_iter.prev();
            self.init_data_block();
            if let Some(it) = &mut self.data_iter {
                it.seek_to_last();
            }
        }
    }

    /// Materialize the data block for the current index entry, reusing the
    /// existing cursor when the handle bytes are unchanged.
    fn init_data_block(&mut self) {
        if !self.index_iter.valid() {
            self.set_data_iter(None);
            return;
        }

        let handle = self.index_iter.value().clone();
        if self.data_iter.is_some() && handle.as_ref() == self.data_block_handle.as_slice() {
            // Already positioned over this block.
            return;
        }

        let data_iter = match (self.block_function)(&handle) {
            Ok(it) => Some(it),
            Err(err) => {
                if self.status.is_none() {
                    self.status = Some(err);
                }
                None
            }
        };
        self.data_block_handle.clear();
        self.data_block_handle.extend_from_slice(&handle);
        self.set_data_iter(data_iter);
    }

    /// Replace the data cursor, keeping any error the old one reported.
    fn set_data_iter(&mut self, data_iter: Option<BlockIter>) {
        if let Some(old) = &self.data_iter {
            if let Err(err) = old.status() {
                if self.status.is_none() {
                    self.status = Some(err);
                }
            }
        }
        self.data_iter = data_iter;
    }
}
