use std::io::Write;
use std::path::Path;

use crate::compression::{into_io, BlockWriter};
use crate::core::Result;

use super::index::SegmentIndexWriter;

/// Totals for a finished segmented channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentedSummary {
    pub segments: u64,
    pub blocks: usize,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

/// Block-compressed output with logical segment boundaries.
pub struct SegmentWriter {
    blocks: BlockWriter,
    index: SegmentIndexWriter,
}

impl SegmentWriter {
    pub fn create(
        data_path: &Path,
        block_index_path: &Path,
        segment_index_path: &Path,
        block_size: usize,
        level: i32,
    ) -> Result<Self> {
        let blocks = BlockWriter::create(data_path, block_index_path, block_size, level)?;
        let index = SegmentIndexWriter::create(segment_index_path)?;
        Ok(Self { blocks, index })
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.blocks.write_bytes(bytes)
    }

    /// Closes the current segment at the present write offset. Returns
    /// `false` if the segment would be empty.
    pub fn mark_segment_boundary(&mut self) -> Result<bool> {
        self.index.mark(self.blocks.position())
    }

    pub fn position(&self) -> u64 {
        self.blocks.position()
    }

    pub fn segments(&self) -> u64 {
        self.index.segments()
    }

    pub fn finish(self) -> Result<SegmentedSummary> {
        let end = self.blocks.position();
        let segments = self.index.finish(end)?;
        let blocks = self.blocks.finish()?;
        Ok(SegmentedSummary {
            segments,
            blocks: blocks.blocks,
            uncompressed_len: blocks.uncompressed_len,
            compressed_len: blocks.compressed_len,
        })
    }
}

impl Write for SegmentWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_bytes(buf).map_err(into_io)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.blocks.flush()
    }
}
