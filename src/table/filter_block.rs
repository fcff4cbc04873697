//! Filter block: per-table membership filters partitioned by block offset.
//!
//! One filter partition covers each 2KB window of data-block offsets, so a
//! reader can test a key against exactly the partition for the block that
//! would contain it. Layout:
//!
//! ```text
//! [filter 0]
//! [filter 1]
//! ...
//! [filter N-1]
//! fixed32(offset of filter 0)
//! ...
//! fixed32(offset of filter N-1)
//! fixed32(offset of the offset array)
//! u8(FILTER_BASE_LG)
//! ```

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};

use super::filter::FilterPolicy;

/// Log2 of the offset window covered by one filter partition.
pub const FILTER_BASE_LG: u8 = 11;

/// Offset window covered by one filter partition (2KB).
const FILTER_BASE: u64 = 1 << FILTER_BASE_LG;

/// Accumulates keys and emits the filter block at table finish.
pub struct FilterBlockBuilder {
    policy: Arc<dyn FilterPolicy>,
    /// Keys added since the last generated partition.
    keys: Vec<Bytes>,
    /// Concatenated filter partitions built so far.
    result: BytesMut,
    /// Start offset of each generated partition within `result`.
    filter_offsets: Vec<u32>,
}

impl FilterBlockBuilder {
    /// Create a builder for the given policy.
    pub fn new(policy: Arc<dyn FilterPolicy>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
            result: BytesMut::new(),
            filter_offsets: Vec::new(),
        }
    }

    /// Record a key for the current partition.
    pub fn add_key(&mut self, key: &[u8]) {
        self.keys.push(Bytes::copy_from_slice(key));
    }

    /// Note that a new data block begins at `block_offset`.
    ///
    /// Generates filter partitions for every 2KB window the file has moved
    /// past since the previous call. Offsets must be non-decreasing.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = block_offset / FILTER_BASE;
        debug_assert!(filter_index >= self.filter_offsets.len() as u64);
        while filter_index > self.filter_offsets.len() as u64 {
            self.generate_filter();
        }
    }

    /// Emit the finished filter block payload.
    pub fn finish(&mut self) -> Bytes {
        if !self.keys.is_empty() {
            self.generate_filter();
        }

        let array_offset = self.result.len() as u32;
        for &offset in &self.filter_offsets {
            self.result.put_u32_le(offset);
        }
        self.result.put_u32_le(array_offset);
        self.result.put_u8(FILTER_BASE_LG);

        std::mem::take(&mut self.result).freeze()
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.keys.is_empty() {
            // Empty windows get a zero-length partition.
            return;
        }

        let filter = self.policy.create_filter(&self.keys);
        self.result.put_slice(&filter);
        self.keys.clear();
    }
}

/// Reads a filter block and answers per-block membership queries.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Bytes,
    /// Start of the offset array.
    array_offset: usize,
    /// Number of filter partitions.
    num_filters: usize,
    base_lg: u8,
}

impl FilterBlockReader {
    /// Parse a filter block. Malformed contents yield a reader that matches
    /// everything (filters are advisory).
    pub fn new(policy: Arc<dyn FilterPolicy>, contents: Bytes) -> Self {
        let mut reader = Self {
            policy,
            data: Bytes::new(),
            array_offset: 0,
            num_filters: 0,
            base_lg: 0,
        };

        let n = contents.len();
        if n < 5 {
            // 1 byte base lg + 4 byte array offset minimum
            return reader;
        }

        let base_lg = contents[n - 1];
        let array_offset = u32::from_le_bytes(contents[n - 5..n - 1].try_into().unwrap()) as usize;
        if array_offset > n - 5 {
            return reader;
        }

        reader.num_filters = (n - 5 - array_offset) / 4;
        reader.array_offset = array_offset;
        reader.base_lg = base_lg;
        reader.data = contents;
        reader
    }

    /// Check whether `key` may be present in the data block starting at
    /// `block_offset`.
    pub fn key_may_match(&self, block_offset: u64, key: &[u8]) -> bool {
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            // Out of range: treat as a potential match.
            return true;
        }

        let start = self.offset_at(index);
        let limit = self.offset_at(index + 1);
        if start <= limit && limit <= self.array_offset {
            if start == limit {
                // Empty partition: no keys mapped to this window.
                return false;
            }
            return self.policy.key_may_match(key, &self.data[start..limit]);
        }

        // Inconsistent offsets: err on the side of a match.
        true
    }

    /// Read entry `index` of the offset array; entry `num_filters` is the
    /// array offset itself, terminating the last partition.
    fn offset_at(&self, index: usize) -> usize {
        let pos = self.array_offset + index * 4;
        u32::from_le_bytes(self.data[pos..pos + 4].try_into().unwrap()) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::filter::BloomFilterPolicy;

    fn policy() -> Arc<dyn FilterPolicy> {
        Arc::new(BloomFilterPolicy::new(10))
    }

    #[test]
    fn test_empty_filter_block() {
        let mut builder = FilterBlockBuilder::new(policy());
        let contents = builder.finish();

        // Just the array offset and base lg.
        assert_eq!(contents.len(), 5);

        let reader = FilterBlockReader::new(policy(), contents);
        assert!(reader.key_may_match(0, b"foo"));
        assert!(reader.key_may_match(100_000, b"foo"));
    }

    #[test]
    fn test_single_partition() {
        let mut builder = FilterBlockBuilder::new(policy());
        builder.start_block(100);
        builder.add_key(b"foo");
        builder.add_key(b"bar");
        builder.start_block(200);
        builder.add_key(b"box");
        builder.start_block(300);
        builder.add_key(b"hello");

        // All offsets fall in the first 2KB window: one partition.
        let reader = FilterBlockReader::new(policy(), builder.finish());
        assert!(reader.key_may_match(100, b"foo"));
        assert!(reader.key_may_match(100, b"bar"));
        assert!(reader.key_may_match(100, b"box"));
        assert!(reader.key_may_match(100, b"hello"));
        assert!(!reader.key_may_match(100, b"missing"));
        assert!(!reader.key_may_match(100, b"other"));
    }

    #[test]
    fn test_multiple_partitions() {
        let mut builder = FilterBlockBuilder::new(policy());

        // First partition (offsets 0..2048).
        builder.start_block(0);
        builder.add_key(b"foo");
        builder.start_block(2000);
        builder.add_key(b"bar");

        // Second partition (offsets 2048..4096).
        builder.start_block(3100);
        builder.add_key(b"box");

        // Third partition is empty; fourth gets one key.
        builder.start_block(9000);
        builder.add_key(b"hat");

        let reader = FilterBlockReader::new(policy(), builder.finish());

        assert!(reader.key_may_match(0, b"foo"));
        assert!(reader.key_may_match(2000, b"bar"));
        assert!(!reader.key_may_match(0, b"box"));

        assert!(reader.key_may_match(3100, b"box"));
        assert!(!reader.key_may_match(3100, b"foo"));

        // The empty window between blocks matches nothing.
        assert!(!reader.key_may_match(4100, b"foo"));
        assert!(!reader.key_may_match(4100, b"box"));

        assert!(reader.key_may_match(9000, b"hat"));
        assert!(!reader.key_may_match(9000, b"foo"));
    }

    #[test]
    fn test_reader_handles_garbage() {
        let reader = FilterBlockReader::new(policy(), Bytes::from_static(b"xx"));
        assert!(reader.key_may_match(0, b"anything"));

        // A plausible length with an absurd array offset.
        let garbage = Bytes::from_static(&[0xff; 16]);
        let reader = FilterBlockReader::new(policy(), garbage);
        assert!(reader.key_may_match(0, b"anything"));
    }
}
