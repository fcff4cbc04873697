//! Block format: decoding and iteration over prefix-compressed entries.

use std::cmp::Ordering;
use std::sync::Arc;

use bytes::Bytes;

use crate::util::coding::decode_varint32;
use crate::util::comparator::Comparator;
use crate::{Error, Result};

/// A decoded block payload.
///
/// Holds the entry data and restart array produced by a
/// [`BlockBuilder`](super::block_builder::BlockBuilder); the framing trailer
/// has already been stripped and verified by the reader.
#[derive(Debug)]
pub struct Block {
    /// The raw block payload.
    data: Bytes,
    /// Offset of the restart array.
    restart_offset: usize,
    /// Number of restart points.
    num_restarts: u32,
}

impl Block {
    /// Create a block from a payload, validating its restart array.
    pub fn new(data: Bytes) -> Result<Self> {
        if data.len() < 4 {
            return Err(Error::corruption("block too short"));
        }

        let num_restarts = u32::from_le_bytes(data[data.len() - 4..].try_into().unwrap());

        let restart_array_size = num_restarts as usize * 4;
        if data.len() < 4 + restart_array_size {
            return Err(Error::corruption("block too short for restart array"));
        }

        let restart_offset = data.len() - 4 - restart_array_size;

        Ok(Self {
            data,
            restart_offset,
            num_restarts,
        })
    }

    /// Get the raw payload.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Get the number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// Get the entry offset stored at restart point `index`.
    fn restart_point(&self, index: u32) -> usize {
        debug_assert!(index < self.num_restarts);
        let offset = self.restart_offset + index as usize * 4;
        u32::from_le_bytes(self.data[offset..offset + 4].try_into().unwrap()) as usize
    }

    /// Decode the full key stored at restart point `index`.
    ///
    /// Entries at restart points never share a prefix, so the key can be read
    /// without reconstructing earlier entries. Returns None on a malformed
    /// entry.
    fn key_at_restart(&self, index: u32) -> Option<&[u8]> {
        let offset = self.restart_point(index);
        if offset >= self.restart_offset {
            return None;
        }

        let mut cursor = &self.data[offset..self.restart_offset];
        let remaining = cursor.len();

        let shared = decode_varint32(&mut cursor)?;
        let unshared = decode_varint32(&mut cursor)? as usize;
        let _value_len = decode_varint32(&mut cursor)?;

        if shared != 0 || cursor.len() < unshared {
            return None;
        }

        let header = remaining - cursor.len();
        Some(&self.data[offset + header..offset + header + unshared])
    }
}

/// Cursor over the entries of a [`Block`].
///
/// Supports bidirectional movement; backward steps re-scan from the nearest
/// restart point.
pub struct BlockIter {
    block: Arc<Block>,
    comparator: Arc<dyn Comparator>,
    /// Offset of the current entry; the restart array offset when invalid.
    current: usize,
    /// Offset just past the current entry.
    next_offset: usize,
    /// Restart block containing `current`.
    restart_index: u32,
    /// Current key, rebuilt incrementally from shared prefixes.
    key: Vec<u8>,
    /// Current value, sliced out of the block payload.
    value: Bytes,
    valid: bool,
    /// First corruption encountered while parsing, if any.
    status: Option<Error>,
}

impl BlockIter {
    /// Create an iterator over `block`. The cursor starts invalid; position
    /// it with one of the seek operations.
    pub fn new(block: Arc<Block>, comparator: Arc<dyn Comparator>) -> Self {
        let limit = block.restart_offset;
        Self {
            block,
            comparator,
            current: limit,
            next_offset: limit,
            restart_index: 0,
            key: Vec::new(),
            value: Bytes::new(),
            valid: false,
            status: None,
        }
    }

    /// Check if the cursor is positioned at an entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Get the current key.
    pub fn key(&self) -> &[u8] {
        debug_assert!(self.valid);
        &self.key
    }

    /// Get the current value.
    pub fn value(&self) -> &Bytes {
        debug_assert!(self.valid);
        &self.value
    }

    /// Get the first corruption encountered, if any.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Position at the first entry.
    pub fn seek_to_first(&mut self) {
        if self.block.num_restarts == 0 {
            self.set_invalid();
            return;
        }
        self.seek_to_restart_point(0);
        self.parse_next_entry();
    }

    /// Position at the last entry.
    pub fn seek_to_last(&mut self) {
        if self.block.num_restarts == 0 {
            self.set_invalid();
            return;
        }
        self.seek_to_restart_point(self.block.num_restarts - 1);
        // Scan forward to the final entry of the block.
        while self.parse_next_entry() && self.next_offset < self.block.restart_offset {}
    }

    /// Position at the first entry with key >= `target`.
    pub fn seek(&mut self, target: &[u8]) {
        if self.block.num_restarts == 0 {
            self.set_invalid();
            return;
        }

        // Binary search the restart array for the last restart point whose
        // key is < target, then scan linearly from there.
        let mut left = 0u32;
        let mut right = self.block.num_restarts - 1;
        while left < right {
            let mid = (left + right + 1) / 2;
            match self.block.key_at_restart(mid) {
                Some(key) if self.comparator.compare(key, target) == Ordering::Less => left = mid,
                Some(_) => right = mid - 1,
                None => {
                    self.corrupted("bad entry at block restart point");
                    return;
                }
            }
        }

        self.seek_to_restart_point(left);
        while self.parse_next_entry() {
            if self.comparator.compare(&self.key, target) != Ordering::Less {
                return;
            }
        }
    }

    /// Advance to the next entry.
    pub fn next(&mut self) {
        debug_assert!(self.valid);
        self.parse_next_entry();
    }

    /// Step back to the previous entry.
    pub fn prev(&mut self) {
        debug_assert!(self.valid);
        let original = self.current;

        // Back up to the last restart point before the current entry.
        while self.block.restart_point(self.restart_index) >= original {
            if self.restart_index == 0 {
                // No entry precedes the first one.
                self.set_invalid();
                return;
            }
            self.restart_index -= 1;
        }

        self.seek_to_restart_point(self.restart_index);
        while self.parse_next_entry() && self.next_offset < original {}
    }

    fn set_invalid(&mut self) {
        let limit = self.block.restart_offset;
        self.current = limit;
        self.next_offset = limit;
        self.restart_index = 0;
        self.key.clear();
        self.value = Bytes::new();
        self.valid = false;
    }

    fn corrupted(&mut self, msg: &str) {
        if self.status.is_none() {
            self.status = Some(Error::corruption(msg));
        }
        self.set_invalid();
    }

    fn seek_to_restart_point(&mut self, index: u32) {
        let offset = self.block.restart_point(index);
        self.restart_index = index;
        self.current = offset;
        self.next_offset = offset;
        self.key.clear();
        self.value = Bytes::new();
        self.valid = false;
    }

    /// Decode the entry at `next_offset`. Returns false at the end of the
    /// block or on corruption.
    fn parse_next_entry(&mut self) -> bool {
        let limit = self.block.restart_offset;
        if self.next_offset >= limit {
            self.set_invalid();
            return false;
        }

        self.current = self.next_offset;
        let data = self.block.data.clone();
        let mut cursor = &data[self.current..limit];
        let remaining = cursor.len();

        let header = match (
            decode_varint32(&mut cursor),
            decode_varint32(&mut cursor),
            decode_varint32(&mut cursor),
        ) {
            (Some(shared), Some(unshared), Some(value_len)) => {
                Some((shared as usize, unshared as usize, value_len as usize))
            }
            _ => None,
        };

        let (shared, unshared, value_len) = match header {
            Some(h) => h,
            None => {
                self.corrupted("bad entry header in block");
                return false;
            }
        };

        if shared > self.key.len() || cursor.len() < unshared + value_len {
            self.corrupted("bad entry in block");
            return false;
        }

        let header_len = remaining - cursor.len();
        let key_start = self.current + header_len;
        let value_start = key_start + unshared;

        self.key.truncate(shared);
        self.key.extend_from_slice(&data[key_start..value_start]);
        self.value = data.slice(value_start..value_start + value_len);
        self.next_offset = value_start + value_len;
        self.valid = true;

        // Keep the restart index pointing at the restart block that contains
        // the current entry.
        while self.restart_index + 1 < self.block.num_restarts
            && self.block.restart_point(self.restart_index + 1) < self.current
        {
            self.restart_index += 1;
        }

        true
    }
}
