use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

use super::index::{BlockEntry, BlockIndex};

pub const DEFAULT_BLOCK_SIZE: usize = 1 << 20;
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// What a finished block file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFileSummary {
    pub blocks: usize,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

/// Streams bytes into independently compressed zstd blocks.
///
/// Buffered bytes are compressed and appended to the data file whenever the
/// buffer reaches `block_size`. The block index is written by [`finish`];
/// a writer dropped before that leaves an unindexed data file behind.
///
/// [`finish`]: BlockWriter::finish
pub struct BlockWriter {
    data_path: PathBuf,
    index_path: PathBuf,
    out: BufWriter<File>,
    buffer: Vec<u8>,
    block_size: usize,
    level: i32,
    index: BlockIndex,
    compressed_offset: u64,
    uncompressed_offset: u64,
}

impl BlockWriter {
    pub fn create(
        data_path: impl Into<PathBuf>,
        index_path: impl Into<PathBuf>,
        block_size: usize,
        level: i32,
    ) -> Result<Self> {
        let data_path = data_path.into();
        let index_path = index_path.into();
        let block_size = if block_size == 0 {
            DEFAULT_BLOCK_SIZE
        } else {
            block_size.min(u32::MAX as usize)
        };
        let file = File::create(&data_path).map_err(Error::at(&data_path))?;
        Ok(Self {
            data_path,
            index_path,
            out: BufWriter::new(file),
            buffer: Vec::with_capacity(block_size),
            block_size,
            level,
            index: BlockIndex::new(block_size as u32),
            compressed_offset: 0,
            uncompressed_offset: 0,
        })
    }

    /// Number of uncompressed bytes accepted so far.
    pub fn position(&self) -> u64 {
        self.uncompressed_offset + self.buffer.len() as u64
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let room = self.block_size - self.buffer.len();
            let take = room.min(bytes.len());
            self.buffer.extend_from_slice(&bytes[..take]);
            bytes = &bytes[take..];
            if self.buffer.len() == self.block_size {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Compresses any buffered remainder, syncs the data file and writes the
    /// block index.
    pub fn finish(mut self) -> Result<BlockFileSummary> {
        self.flush_block()?;
        self.out.flush().map_err(Error::at(&self.data_path))?;
        self.out
            .get_ref()
            .sync_all()
            .map_err(Error::at(&self.data_path))?;
        self.index.write_to(&self.index_path)?;
        Ok(BlockFileSummary {
            blocks: self.index.entries.len(),
            uncompressed_len: self.uncompressed_offset,
            compressed_len: self.compressed_offset,
        })
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let compressed = zstd::bulk::compress(&self.buffer, self.level)
            .map_err(Error::at(&self.data_path))?;
        self.out
            .write_all(&compressed)
            .map_err(Error::at(&self.data_path))?;

        let entry = BlockEntry {
            compressed_offset: self.compressed_offset,
            uncompressed_offset: self.uncompressed_offset,
            compressed_size: compressed.len() as u32,
            uncompressed_size: self.buffer.len() as u32,
            crc32: crc32fast::hash(&self.buffer),
        };
        log::trace!(
            "block {} of {}: {} -> {} bytes",
            self.index.entries.len(),
            self.data_path.display(),
            entry.uncompressed_size,
            entry.compressed_size
        );
        self.index.entries.push(entry);
        self.compressed_offset += compressed.len() as u64;
        self.uncompressed_offset += self.buffer.len() as u64;
        self.buffer.clear();
        Ok(())
    }
}

impl Write for BlockWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf).map_err(into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // Blocks are only cut at block_size or on finish.
        self.out.flush()
    }
}

pub(crate) fn into_io(err: Error) -> std::io::Error {
    match err {
        Error::Io(err) => err,
        Error::StorageIo { source, .. } => source,
        other => std::io::Error::new(std::io::ErrorKind::Other, other),
    }
}
