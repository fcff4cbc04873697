//! Table reader: opens a finished table file and serves reads from it.

use std::cmp::Ordering;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tracing::debug;

use crate::options::{Options, ReadOptions};
use crate::util::comparator::BytewiseComparator;
use crate::util::crc::{crc32c, crc32c_extend, unmask_crc};
use crate::{Error, Result};

use super::block::{Block, BlockIter};
use super::filter_block::FilterBlockReader;
use super::two_level_iterator::TwoLevelIterator;
use super::{BlockHandle, CompressionType, Footer, BLOCK_TRAILER_SIZE, FOOTER_SIZE};

/// An open table file.
///
/// The footer, index block, and filter block are loaded eagerly; data blocks
/// are materialized per read. The file handle is mutex-guarded so a shared
/// table can hand out iterators.
pub struct Table {
    file: Mutex<File>,
    options: Options,
    index_block: Arc<Block>,
    filter: Option<FilterBlockReader>,
}

impl std::fmt::Debug for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table").finish_non_exhaustive()
    }
}

impl Table {
    /// Open the table at `path`.
    ///
    /// `options` must name the same comparator the table was built with; the
    /// filter block is loaded iff `options.filter_policy` matches a filter
    /// recorded in the metaindex.
    pub fn open(path: &Path, options: Options) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::corruption("file too small for footer"));
        }

        let mut footer_buf = [0u8; FOOTER_SIZE];
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        file.read_exact(&mut footer_buf)?;
        let footer = Footer::decode(&footer_buf)?;

        let index_contents = read_block_at(&mut file, &footer.index_handle, true)?;
        let index_block = Arc::new(Block::new(index_contents)?);

        let filter = Self::read_filter(&mut file, &footer, &options)?;

        debug!(
            file_size,
            index_offset = footer.index_handle.offset(),
            has_filter = filter.is_some(),
            "opened table"
        );

        Ok(Self {
            file: Mutex::new(file),
            options,
            index_block,
            filter,
        })
    }

    /// Look up the configured filter policy in the metaindex and load its
    /// block. Metaindex entries with unrecognized names are ignored.
    fn read_filter(
        file: &mut File,
        footer: &Footer,
        options: &Options,
    ) -> Result<Option<FilterBlockReader>> {
        let policy = match &options.filter_policy {
            Some(policy) => policy.clone(),
            None => return Ok(None),
        };

        let meta_contents = read_block_at(file, &footer.metaindex_handle, true)?;
        let meta_block = Arc::new(Block::new(meta_contents)?);

        let mut key = Vec::from(&b"filter."[..]);
        key.extend_from_slice(policy.name().as_bytes());

        // Metaindex keys are plain names, always in bytewise order.
        let mut iter = BlockIter::new(meta_block, Arc::new(BytewiseComparator::new()));
        iter.seek(&key);
        if !iter.valid() || iter.key() != key.as_slice() {
            return Ok(None);
        }

        let mut cursor = iter.value().as_ref();
        let handle = BlockHandle::decode(&mut cursor)?;
        let contents = read_block_at(file, &handle, true)?;
        Ok(Some(FilterBlockReader::new(policy, contents)))
    }

    /// Create an iterator over every entry in the table.
    pub fn iter(
        &self,
        read_options: ReadOptions,
    ) -> TwoLevelIterator<impl FnMut(&[u8]) -> Result<BlockIter> + '_> {
        let index_iter = BlockIter::new(self.index_block.clone(), self.options.comparator.clone());
        let comparator = self.options.comparator.clone();

        TwoLevelIterator::new(index_iter, move |handle_bytes: &[u8]| {
            let mut cursor = handle_bytes;
            let handle = BlockHandle::decode(&mut cursor)?;
            let block = self.read_block(&handle, &read_options)?;
            Ok(BlockIter::new(block, comparator.clone()))
        })
    }

    /// Get the value stored for `key`, if any.
    pub fn get(&self, key: &[u8], read_options: &ReadOptions) -> Result<Option<Bytes>> {
        let mut index_iter =
            BlockIter::new(self.index_block.clone(), self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(None);
        }

        let mut cursor = index_iter.value().as_ref();
        let handle = BlockHandle::decode(&mut cursor)?;

        // The filter partition for the candidate block can rule the key out
        // without touching the block itself.
        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset(), key) {
                return Ok(None);
            }
        }

        let block = self.read_block(&handle, read_options)?;
        let mut block_iter = BlockIter::new(block, self.options.comparator.clone());
        block_iter.seek(key);
        if block_iter.valid()
            && self.options.comparator.compare(block_iter.key(), key) == Ordering::Equal
        {
            return Ok(Some(block_iter.value().clone()));
        }
        block_iter.status()?;
        Ok(None)
    }

    /// Check whether `key` may be present, consulting only the index and the
    /// filter block. Always true when no filter is configured.
    pub fn may_contain(&self, key: &[u8]) -> Result<bool> {
        let filter = match &self.filter {
            Some(filter) => filter,
            None => return Ok(true),
        };

        let mut index_iter =
            BlockIter::new(self.index_block.clone(), self.options.comparator.clone());
        index_iter.seek(key);
        if !index_iter.valid() {
            index_iter.status()?;
            return Ok(false);
        }

        let mut cursor = index_iter.value().as_ref();
        let handle = BlockHandle::decode(&mut cursor)?;
        Ok(filter.key_may_match(handle.offset(), key))
    }

    fn read_block(&self, handle: &BlockHandle, read_options: &ReadOptions) -> Result<Arc<Block>> {
        let mut file = self.file.lock();
        let contents = read_block_at(&mut file, handle, read_options.verify_checksums)?;
        Ok(Arc::new(Block::new(contents)?))
    }
}

/// Read a framed block: verify the trailer CRC, check the compression tag,
/// and return the decompressed payload.
fn read_block_at(file: &mut File, handle: &BlockHandle, verify_checksum: bool) -> Result<Bytes> {
    let payload_len = handle.size() as usize;
    let mut buf = vec![0u8; payload_len + BLOCK_TRAILER_SIZE];
    file.seek(SeekFrom::Start(handle.offset()))?;
    file.read_exact(&mut buf)?;

    let (payload, trailer) = buf.split_at(payload_len);
    let tag = trailer[0];

    if verify_checksum {
        let stored = unmask_crc(u32::from_le_bytes(trailer[1..5].try_into().unwrap()));
        let actual = crc32c_extend(crc32c(payload), &trailer[..1]);
        if stored != actual {
            return Err(Error::corruption("block checksum mismatch"));
        }
    }

    match CompressionType::from_byte(tag) {
        Some(CompressionType::None) => {
            let mut payload = Bytes::from(buf);
            payload.truncate(payload_len);
            Ok(payload)
        }
        Some(CompressionType::Snappy) => {
            let decompressed = snap::raw::Decoder::new()
                .decompress_vec(payload)
                .map_err(|e| Error::corruption(format!("snappy decompress failed: {}", e)))?;
            Ok(Bytes::from(decompressed))
        }
        Some(CompressionType::Lz4) => {
            let decompressed = lz4_flex::decompress_size_prepended(payload)
                .map_err(|e| Error::corruption(format!("lz4 decompress failed: {}", e)))?;
            Ok(Bytes::from(decompressed))
        }
        None => Err(Error::corruption(format!(
            "unknown compression tag: {}",
            tag
        ))),
    }
}
