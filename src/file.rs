//! Append-only file abstraction used by the table builder.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::Result;

/// Write buffer capacity for [`FileWriter`].
const WRITE_BUFFER_SIZE: usize = 16 * 1024;

/// A file that supports sequential appends.
///
/// The builder owns its file exclusively and only ever appends and flushes;
/// durability (sync) and close are left to the caller.
pub trait WritableFile {
    /// Append `data` at the current end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Push buffered data to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Force written data to stable storage.
    fn sync(&mut self) -> Result<()>;

    /// Flush and close the file.
    fn close(&mut self) -> Result<()>;
}

/// A [`WritableFile`] backed by a buffered [`File`].
pub struct FileWriter {
    writer: BufWriter<File>,
}

impl FileWriter {
    /// Create (truncating) a file at `path` for writing.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, file),
        })
    }
}

impl WritableFile for FileWriter {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}
