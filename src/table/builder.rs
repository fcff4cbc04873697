//! Table builder: serializes a sorted key/value stream into a table file.

use bytes::{Bytes, BytesMut};
use tracing::{debug, trace};

use crate::file::WritableFile;
use crate::options::Options;
use crate::util::crc::{crc32c, crc32c_extend, mask_crc};
use crate::{Error, Result};

use super::block_builder::BlockBuilder;
use super::filter_block::FilterBlockBuilder;
use super::{BlockHandle, CompressionType, Footer, BLOCK_TRAILER_SIZE};

/// Builds a table file from key/value pairs added in sorted order.
///
/// The builder owns its file exclusively and is write-once: after
/// [`finish`](TableBuilder::finish) or [`abandon`](TableBuilder::abandon) no
/// further mutation is allowed. Errors from the file are sticky; once a write
/// fails, every later operation is a no-op and `finish` surfaces the first
/// error.
pub struct TableBuilder<W: WritableFile> {
    options: Options,
    file: W,
    /// Bytes appended so far; the file is assumed to start empty.
    offset: u64,
    /// First error encountered, if any. Sticky.
    status: Option<Error>,
    /// Encoder for the data block being filled.
    data_block: BlockBuilder,
    /// Encoder for the index block, emitted at finish.
    index_block: BlockBuilder,
    /// Most recently added key.
    last_key: Vec<u8>,
    /// Number of successful `add` calls.
    num_entries: u64,
    /// Set by `finish` and `abandon`.
    closed: bool,
    /// Filter accumulator, present iff a filter policy is configured.
    filter_block: Option<FilterBlockBuilder>,
    /// Handle of the just-flushed data block, waiting for its index entry.
    ///
    /// The index entry for a block is deferred until the next block's first
    /// key arrives so a short separator can be chosen; `finish` drains a
    /// still-pending handle with a short successor instead.
    pending_handle: Option<BlockHandle>,
    /// Reusable scratch buffer for compression output.
    compressed_output: Vec<u8>,
}

impl<W: WritableFile> TableBuilder<W> {
    /// Create a builder writing to `file`, which must be empty.
    pub fn new(options: Options, file: W) -> Self {
        let mut filter_block = options
            .filter_policy
            .clone()
            .map(FilterBlockBuilder::new);
        if let Some(fb) = &mut filter_block {
            fb.start_block(0);
        }

        Self {
            data_block: BlockBuilder::new(options.block_restart_interval),
            // Index entries are few and looked up by binary search, so every
            // entry is its own restart point.
            index_block: BlockBuilder::new(1),
            options,
            file,
            offset: 0,
            status: None,
            last_key: Vec::new(),
            num_entries: 0,
            closed: false,
            filter_block,
            pending_handle: None,
            compressed_output: Vec::new(),
        }
    }

    /// Change the builder's options mid-build.
    ///
    /// The comparator defines the meaning of every key already written and
    /// cannot change. All other fields may; blocks written earlier keep the
    /// codec they were written with (each block carries its own tag).
    pub fn change_options(&mut self, options: Options) -> Result<()> {
        if options.comparator.name() != self.options.comparator.name() {
            return Err(Error::invalid_argument(
                "changing comparator while building table",
            ));
        }

        self.data_block
            .set_restart_interval(options.block_restart_interval);
        self.options = options;
        Ok(())
    }

    /// Add a key/value pair.
    ///
    /// `key` must be greater than every previously added key under the
    /// builder's comparator.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        debug_assert!(!self.closed, "add after finish/abandon");
        if let Some(err) = &self.status {
            return Err(err.clone());
        }
        if self.num_entries > 0 {
            debug_assert!(
                self.options.comparator.compare(key, &self.last_key) == std::cmp::Ordering::Greater,
                "keys must be added in strictly increasing order"
            );
        }

        if let Some(handle) = self.pending_handle.take() {
            debug_assert!(self.data_block.is_empty());
            // The separator only has to sort between the flushed block's last
            // key and this one, so it can usually be shortened.
            let separator = self
                .options
                .comparator
                .find_shortest_separator(&self.last_key, key);
            let mut handle_encoding = BytesMut::new();
            handle.encode_to(&mut handle_encoding);
            self.index_block.add(&separator, &handle_encoding);
        }

        if let Some(fb) = &mut self.filter_block {
            fb.add_key(key);
        }

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;
        self.data_block.add(key, value);

        if self.data_block.current_size_estimate() >= self.options.block_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write the data block being filled, if any, to the file.
    ///
    /// A no-op on an empty data block; calling this between adds guarantees
    /// the surrounding entries land in different blocks.
    pub fn flush(&mut self) -> Result<()> {
        debug_assert!(!self.closed, "flush after finish/abandon");
        if let Some(err) = &self.status {
            return Err(err.clone());
        }
        if self.data_block.is_empty() {
            return Ok(());
        }
        debug_assert!(self.pending_handle.is_none());

        let raw = self.data_block.finish();
        trace!(offset = self.offset, size = raw.len(), "flushing data block");
        let handle = self.write_block(raw)?;
        self.data_block.reset();
        self.pending_handle = Some(handle);

        let flushed = self.file.flush();
        if let Err(err) = &flushed {
            self.status = Some(err.clone());
        }
        if let Some(fb) = &mut self.filter_block {
            fb.start_block(self.offset);
        }
        flushed
    }

    /// Finish the table: write the filter, metaindex, and index blocks and
    /// the footer. Returns the first error encountered during the build.
    pub fn finish(&mut self) -> Result<()> {
        debug_assert!(!self.closed, "finish after finish/abandon");
        let _ = self.flush();
        self.closed = true;
        if let Some(err) = &self.status {
            return Err(err.clone());
        }

        // Filter block: its encoding is already bit-packed, so it is framed
        // raw rather than run through the configured codec.
        let filter_contents = self.filter_block.as_mut().map(|fb| fb.finish());
        let mut filter_handle = None;
        if let Some(contents) = filter_contents {
            filter_handle = Some(self.write_raw_block(&contents, CompressionType::None)?);
        }

        // Metaindex block: maps meta block names to their handles. Readers
        // ignore names they do not recognize.
        let mut metaindex_block = BlockBuilder::new(self.options.block_restart_interval);
        if let (Some(policy), Some(handle)) = (&self.options.filter_policy, filter_handle) {
            let mut key = Vec::from(&b"filter."[..]);
            key.extend_from_slice(policy.name().as_bytes());
            let mut handle_encoding = BytesMut::new();
            handle.encode_to(&mut handle_encoding);
            metaindex_block.add(&key, &handle_encoding);
        }
        let metaindex_handle = self.write_block(metaindex_block.finish())?;

        // Index block: drain the final pending entry with a key that just has
        // to be >= everything in the last block.
        if let Some(handle) = self.pending_handle.take() {
            let successor = self.options.comparator.find_short_successor(&self.last_key);
            let mut handle_encoding = BytesMut::new();
            handle.encode_to(&mut handle_encoding);
            self.index_block.add(&successor, &handle_encoding);
        }
        let index_payload = self.index_block.finish();
        let index_handle = self.write_block(index_payload)?;

        let footer = Footer::new(metaindex_handle, index_handle);
        let encoded = footer.encode();
        if let Err(err) = self.file.append(&encoded) {
            self.status = Some(err.clone());
            return Err(err);
        }
        self.offset += encoded.len() as u64;

        let flushed = self.file.flush();
        if let Err(err) = &flushed {
            self.status = Some(err.clone());
        }

        debug!(
            entries = self.num_entries,
            file_size = self.offset,
            "finished table"
        );
        flushed
    }

    /// Stop building without writing anything further.
    ///
    /// Already-appended bytes are not rolled back; the caller is expected to
    /// delete the file.
    pub fn abandon(&mut self) {
        debug_assert!(!self.closed, "abandon after finish/abandon");
        self.closed = true;
    }

    /// Number of `add` calls so far.
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }

    /// Bytes appended so far; after a successful `finish` this is the final
    /// file size.
    pub fn file_size(&self) -> u64 {
        self.offset
    }

    /// First error encountered, if any.
    pub fn status(&self) -> Result<()> {
        match &self.status {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Consume the builder and return its file, so the caller can decide on
    /// durability (sync) and close.
    pub fn into_file(self) -> W {
        debug_assert!(self.closed, "into_file before finish/abandon");
        self.file
    }

    /// Frame and append a block payload, compressing it if the configured
    /// codec saves at least 12.5%.
    fn write_block(&mut self, raw: Bytes) -> Result<BlockHandle> {
        let mut scratch = std::mem::take(&mut self.compressed_output);

        let (contents, tag): (&[u8], CompressionType) = match self.options.compression {
            CompressionType::None => (raw.as_ref(), CompressionType::None),
            CompressionType::Snappy => {
                scratch.resize(snap::raw::max_compress_len(raw.len()), 0);
                match snap::raw::Encoder::new().compress(&raw, &mut scratch) {
                    Ok(n) if n < raw.len() - raw.len() / 8 => {
                        (&scratch[..n], CompressionType::Snappy)
                    }
                    // Compression failed or saved too little; store raw.
                    _ => (raw.as_ref(), CompressionType::None),
                }
            }
            CompressionType::Lz4 => {
                scratch = lz4_flex::compress_prepend_size(&raw);
                if scratch.len() < raw.len() - raw.len() / 8 {
                    (&scratch[..], CompressionType::Lz4)
                } else {
                    (raw.as_ref(), CompressionType::None)
                }
            }
        };

        let result = self.write_raw_block(contents, tag);
        scratch.clear();
        self.compressed_output = scratch;
        result
    }

    /// Append `contents` followed by its 5-byte trailer: the compression tag
    /// and the masked CRC32C of payload plus tag.
    fn write_raw_block(&mut self, contents: &[u8], tag: CompressionType) -> Result<BlockHandle> {
        debug_assert!(self.status.is_none());
        let handle = BlockHandle::new(self.offset, contents.len() as u64);

        let mut trailer = [0u8; BLOCK_TRAILER_SIZE];
        trailer[0] = tag.to_byte();
        let crc = crc32c_extend(crc32c(contents), &trailer[..1]);
        trailer[1..].copy_from_slice(&mask_crc(crc).to_le_bytes());

        let mut io = self.file.append(contents);
        if io.is_ok() {
            io = self.file.append(&trailer);
        }
        match io {
            Ok(()) => {
                self.offset += (contents.len() + BLOCK_TRAILER_SIZE) as u64;
                Ok(handle)
            }
            Err(err) => {
                self.status = Some(err.clone());
                Err(err)
            }
        }
    }
}
