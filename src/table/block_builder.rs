//! Block builder: prefix-compressed key/value runs with restart points.

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::encode_varint32;

/// Builder for the payload of a single block.
///
/// Keys are prefix-compressed against the previous entry; every
/// `restart_interval` entries a restart point stores a full key so readers
/// can binary-search. The finished payload ends with the restart offsets and
/// their count:
///
/// ```text
/// entry := varint(shared) varint(unshared) varint(value_len) key_suffix value
/// block := entry* fixed32(restart_offset)* fixed32(num_restarts)
/// ```
pub struct BlockBuilder {
    /// Buffer for entry data.
    buffer: BytesMut,
    /// Restart point offsets.
    restarts: Vec<u32>,
    /// Number of entries since the last restart.
    counter: usize,
    /// Restart interval.
    restart_interval: usize,
    /// Last key added (for prefix compression).
    last_key: Vec<u8>,
    /// Set once `finish` has been called, cleared by `reset`.
    finished: bool,
}

impl BlockBuilder {
    /// Create a builder emitting a restart point every `restart_interval`
    /// entries.
    pub fn new(restart_interval: usize) -> Self {
        debug_assert!(restart_interval >= 1);
        Self {
            buffer: BytesMut::new(),
            restarts: vec![0],
            counter: 0,
            restart_interval,
            last_key: Vec::new(),
            finished: false,
        }
    }

    /// Change the restart interval. Takes effect from the next restart point.
    pub fn set_restart_interval(&mut self, restart_interval: usize) {
        debug_assert!(restart_interval >= 1);
        self.restart_interval = restart_interval;
    }

    /// Add a key-value pair to the block.
    ///
    /// Keys must be added in strictly increasing order under the table's
    /// comparator; the caller enforces this.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        debug_assert!(!self.finished);

        let shared = if self.counter < self.restart_interval {
            // Share the common prefix with the previous key.
            let min_len = std::cmp::min(self.last_key.len(), key.len());
            let mut shared = 0;
            while shared < min_len && self.last_key[shared] == key[shared] {
                shared += 1;
            }
            shared
        } else {
            // Start a new restart point with a full key.
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
            0
        };

        let unshared = key.len() - shared;

        encode_varint32(&mut self.buffer, shared as u32);
        encode_varint32(&mut self.buffer, unshared as u32);
        encode_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.put_slice(&key[shared..]);
        self.buffer.put_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Check if the block has no entries.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Estimate of the finished payload size for the entries added so far.
    pub fn current_size_estimate(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// Finish the block and return its payload.
    pub fn finish(&mut self) -> Bytes {
        debug_assert!(!self.finished);
        self.finished = true;

        for &restart in &self.restarts {
            self.buffer.put_u32_le(restart);
        }
        self.buffer.put_u32_le(self.restarts.len() as u32);

        std::mem::take(&mut self.buffer).freeze()
    }

    /// Reset the builder for a new block.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.restarts.clear();
        self.restarts.push(0);
        self.counter = 0;
        self.last_key.clear();
        self.finished = false;
    }
}
