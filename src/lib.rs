//! # rusttable
//!
//! An immutable sorted-table file format with a block-based writer, reader,
//! and iterators. Tables are the on-disk building block of log-structured
//! storage engines: write-once files of sorted key-value pairs, randomly
//! readable and self-describing from their tail.
//!
//! ## Features
//!
//! - **Block-based layout**: prefix-compressed data blocks with restart
//!   points for binary search
//! - **Shortened index keys**: index entries store separators, not full keys
//! - **Checksums**: every block framed with a masked CRC32C
//! - **Compression**: optional Snappy/LZ4, applied per block only when it
//!   pays for itself
//! - **Membership filters**: optional per-block Bloom filters to skip reads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rusttable::{FileWriter, Options, ReadOptions, Table, TableBuilder};
//!
//! // Build a table from sorted pairs.
//! let file = FileWriter::create(path)?;
//! let mut builder = TableBuilder::new(Options::default(), file);
//! builder.add(b"apple", b"red")?;
//! builder.add(b"banana", b"yellow")?;
//! builder.finish()?;
//!
//! // Read it back.
//! let table = Table::open(path, Options::default())?;
//! let mut iter = table.iter(ReadOptions::default());
//! iter.seek_to_first();
//! while iter.valid() {
//!     println!("{:?} => {:?}", iter.key(), iter.value());
//!     iter.next();
//! }
//! ```

pub mod error;
pub mod file;
pub mod options;
pub mod table;
pub mod util;

// Re-export main types for convenience
pub use error::{Error, Result};
pub use file::{FileWriter, WritableFile};
pub use options::{Options, ReadOptions};

pub use table::builder::TableBuilder;
pub use table::reader::Table;
pub use table::two_level_iterator::TwoLevelIterator;
pub use table::{BlockHandle, CompressionType, Footer};

pub use table::filter::{BloomFilterPolicy, FilterPolicy};
pub use util::comparator::{BytewiseComparator, Comparator};
