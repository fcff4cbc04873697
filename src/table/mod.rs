//! Immutable sorted tables: on-disk format, builder, reader, and iterators.
//!
//! A table is a self-describing file of sorted key-value pairs, discoverable
//! from its tail.
//!
//! # File Format
//!
//! ```text
//! +------------------+
//! | Data Block 1     |
//! +------------------+
//! | ...              |
//! +------------------+
//! | Data Block N     |
//! +------------------+
//! | Filter Block     |  (optional; framed, never compressed)
//! +------------------+
//! | Metaindex Block  |  (names of meta blocks -> block handles)
//! +------------------+
//! | Index Block      |  (separator keys -> data block handles)
//! +------------------+
//! | Footer           |  (fixed size: metaindex + index handles, magic)
//! +------------------+
//! ```
//!
//! Every block except the footer is framed with a 5-byte trailer holding a
//! one-byte compression tag and the masked CRC32C of the payload plus tag.

pub mod block;
pub mod block_builder;
pub mod builder;
pub mod filter;
pub mod filter_block;
pub mod reader;
pub mod two_level_iterator;

use bytes::{BufMut, Bytes, BytesMut};

use crate::util::coding::{decode_varint64, encode_varint64, MAX_VARINT64_LEN};
use crate::{Error, Result};

/// Magic number at the end of every table file.
pub const FOOTER_MAGIC: u64 = 0xdb4775248b80fb57;

/// Footer size: two maximally-padded block handles plus the magic.
pub const FOOTER_SIZE: usize = 2 * BlockHandle::MAX_ENCODED_LENGTH + 8;

/// Block trailer size: compression tag (1) + masked CRC (4).
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Compression applied to a block's payload.
///
/// Each block carries its own tag, so a single file may mix codecs (for
/// example after compression options changed mid-build).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression.
    #[default]
    None = 0,
    /// Snappy compression.
    Snappy = 1,
    /// LZ4 compression.
    Lz4 = 2,
}

impl CompressionType {
    /// Create from a stored tag byte. Unknown tags are rejected by readers.
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Lz4),
            _ => None,
        }
    }

    /// Convert to the stored tag byte.
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Handle to a block within a table file.
///
/// Locates a framed block's payload; the size excludes the 5-byte trailer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    /// Maximum length of a varint-encoded handle.
    pub const MAX_ENCODED_LENGTH: usize = 2 * MAX_VARINT64_LEN;

    /// Create a new block handle.
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// File offset of the block payload.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Payload size in bytes, excluding the trailer.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Append the varint encoding of this handle to `buf`.
    pub fn encode_to(&self, buf: &mut BytesMut) {
        encode_varint64(buf, self.offset);
        encode_varint64(buf, self.size);
    }

    /// Decode a handle from `data`, advancing it past the encoding.
    pub fn decode(data: &mut &[u8]) -> Result<Self> {
        let offset = decode_varint64(data)
            .ok_or_else(|| Error::corruption("bad block handle offset"))?;
        let size =
            decode_varint64(data).ok_or_else(|| Error::corruption("bad block handle size"))?;
        Ok(Self { offset, size })
    }
}

/// Footer of a table file.
///
/// Fixed size so readers can locate it from the end of the file; holds the
/// handles of the metaindex and index blocks.
#[derive(Debug, Clone, Copy)]
pub struct Footer {
    /// Handle to the metaindex block.
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block.
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Create a new footer.
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self {
            metaindex_handle,
            index_handle,
        }
    }

    /// Encode the footer to its fixed-size representation.
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FOOTER_SIZE);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        // Pad so both handles can grow to their maximum varint width.
        buf.resize(2 * BlockHandle::MAX_ENCODED_LENGTH, 0);
        buf.put_u64_le(FOOTER_MAGIC);

        debug_assert_eq!(buf.len(), FOOTER_SIZE);
        buf.freeze()
    }

    /// Decode a footer from the final [`FOOTER_SIZE`] bytes of a file.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < FOOTER_SIZE {
            return Err(Error::corruption("footer too short"));
        }

        let footer = &data[data.len() - FOOTER_SIZE..];
        let magic = u64::from_le_bytes(footer[FOOTER_SIZE - 8..].try_into().unwrap());
        if magic != FOOTER_MAGIC {
            return Err(Error::corruption("bad footer magic (not a table file?)"));
        }

        let mut cursor = &footer[..FOOTER_SIZE - 8];
        let metaindex_handle = BlockHandle::decode(&mut cursor)?;
        let index_handle = BlockHandle::decode(&mut cursor)?;

        Ok(Self {
            metaindex_handle,
            index_handle,
        })
    }
}
