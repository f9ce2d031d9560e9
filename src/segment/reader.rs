use std::io::Write;
use std::path::Path;

use crate::compression::BlockReader;
use crate::core::{Error, Result};

use super::index::SegmentIndex;
use super::selection::SegmentSelection;

/// Segment-aware reader over one block-compressed channel.
///
/// Callers narrow the selection with [`include`]/[`exclude`] and then
/// [`read`] the selected segments in ascending order. Each segment is served
/// by translating its offsets into a block range read, so unselected blocks
/// are never decompressed.
///
/// [`include`]: SegmentReader::include
/// [`exclude`]: SegmentReader::exclude
/// [`read`]: SegmentReader::read
pub struct SegmentReader {
    blocks: BlockReader,
    index: SegmentIndex,
    selection: SegmentSelection,
}

impl SegmentReader {
    pub fn open(data_path: &Path, block_index_path: &Path, segment_index_path: &Path) -> Result<Self> {
        let blocks = BlockReader::open(data_path, block_index_path)?;
        let index = SegmentIndex::load(segment_index_path, blocks.len())?;
        Ok(Self {
            blocks,
            index,
            selection: SegmentSelection::new(),
        })
    }

    pub fn count(&self) -> u64 {
        self.index.count()
    }

    /// Total decompressed length of the channel.
    pub fn len(&self) -> u64 {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn include(&mut self, segment: u64) -> &mut Self {
        self.selection.include(segment);
        self
    }

    pub fn exclude(&mut self, segment: u64) -> &mut Self {
        self.selection.exclude(segment);
        self
    }

    pub fn include_all(&mut self) -> &mut Self {
        self.selection.include_all();
        self
    }

    pub fn selected(&self) -> Result<Vec<u64>> {
        self.selection.resolve(self.count())
    }

    /// Reads one segment regardless of the current selection.
    pub fn segment(&mut self, segment: u64) -> Result<Vec<u8>> {
        let (start, end) = self.index.range(segment)?;
        self.blocks.read_range(start, end)
    }

    /// Selected segments as `(segment, bytes)` pairs in ascending order.
    pub fn read_segments(&mut self) -> Result<Vec<(u64, Vec<u8>)>> {
        let selected = self.selected()?;
        let mut out = Vec::with_capacity(selected.len());
        for segment in selected {
            out.push((segment, self.segment(segment)?));
        }
        Ok(out)
    }

    /// Concatenated bytes of the selected segments.
    pub fn read(&mut self) -> Result<Vec<u8>> {
        if self.selection.is_default() {
            return self.blocks.read_all();
        }
        let mut out = Vec::new();
        self.read_into(&mut out)?;
        Ok(out)
    }

    /// Streams the selected segments into `sink`, returning the byte count.
    pub fn read_into<W: Write + ?Sized>(&mut self, sink: &mut W) -> Result<u64> {
        let mut written = 0u64;
        for segment in self.selected()? {
            let bytes = self.segment(segment)?;
            sink.write_all(&bytes).map_err(Error::Io)?;
            written += bytes.len() as u64;
        }
        Ok(written)
    }
}
