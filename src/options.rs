//! Configuration options for table building and reading.

use std::sync::Arc;

use crate::table::filter::FilterPolicy;
use crate::table::CompressionType;
use crate::util::comparator::{BytewiseComparator, Comparator};

/// Default target size for data blocks (4KB).
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default number of entries between restart points in a data block.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Options that control how a table is built.
///
/// Options are cheap to copy; the comparator and filter policy are shared
/// read-only and must be deterministic.
#[derive(Clone)]
pub struct Options {
    /// Total order over keys. Fixed for the lifetime of a builder.
    pub comparator: Arc<dyn Comparator>,

    /// Target uncompressed size that triggers a data-block flush.
    ///
    /// This is compared against the block encoder's running estimate, so it
    /// is a target rather than a hard cap.
    pub block_size: usize,

    /// Number of entries between restart points in data blocks.
    pub block_restart_interval: usize,

    /// Compression codec applied to data, metaindex, and index blocks.
    pub compression: CompressionType,

    /// Filter policy for membership filters. `None` disables the filter block.
    pub filter_policy: Option<Arc<dyn FilterPolicy>>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparator: Arc::new(BytewiseComparator::new()),
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: CompressionType::None,
            filter_policy: None,
        }
    }
}

impl Options {
    /// Create new options with defaults.
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("comparator", &self.comparator.name())
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field(
                "filter_policy",
                &self.filter_policy.as_ref().map(|p| p.name().to_string()),
            )
            .finish()
    }
}

/// Options that control a single read.
#[derive(Debug, Clone, Copy)]
pub struct ReadOptions {
    /// Verify block checksums against the stored masked CRC.
    pub verify_checksums: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: true,
        }
    }
}
