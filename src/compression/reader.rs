use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

use super::index::{BlockEntry, BlockIndex};

/// Random-access reader over a block-compressed file.
///
/// Only the blocks overlapping a requested range are decompressed. The last
/// decompressed block is kept so consecutive reads within one block do not
/// decompress it again.
pub struct BlockReader {
    data_path: PathBuf,
    file: File,
    index: BlockIndex,
    cached: Option<CachedBlock>,
}

struct CachedBlock {
    position: usize,
    data: Vec<u8>,
}

impl BlockReader {
    pub fn open(data_path: impl Into<PathBuf>, index_path: impl AsRef<Path>) -> Result<Self> {
        let data_path = data_path.into();
        let index = BlockIndex::read_from(index_path.as_ref())?;
        let file = File::open(&data_path).map_err(Error::at(&data_path))?;
        let data_len = file.metadata().map_err(Error::at(&data_path))?.len();
        let indexed_len = index
            .entries
            .last()
            .map_or(0, |entry| entry.compressed_offset + entry.compressed_size as u64);
        if data_len < indexed_len {
            return Err(Error::Corrupt(format!(
                "{} holds {data_len} bytes but its index covers {indexed_len}",
                data_path.display()
            )));
        }
        Ok(Self {
            data_path,
            file,
            index,
            cached: None,
        })
    }

    /// Total decompressed length.
    pub fn len(&self) -> u64 {
        self.index.uncompressed_len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn block_count(&self) -> usize {
        self.index.entries.len()
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    /// Returns decompressed bytes `start..end`.
    pub fn read_range(&mut self, start: u64, end: u64) -> Result<Vec<u8>> {
        let len = self.len();
        if start > end || end > len {
            return Err(Error::InvalidRange { start, end, len });
        }
        let mut out = Vec::with_capacity((end - start) as usize);
        if start == end {
            return Ok(out);
        }

        let mut position = self
            .index
            .position_for_offset(start)
            .ok_or(Error::InvalidRange { start, end, len })?;
        let mut cursor = start;
        while cursor < end {
            let entry = self.index.entries[position];
            let block = self.block(position)?;
            let from = (cursor - entry.uncompressed_offset) as usize;
            let to = (end.min(entry.uncompressed_end()) - entry.uncompressed_offset) as usize;
            out.extend_from_slice(&block[from..to]);
            cursor = entry.uncompressed_offset + to as u64;
            position += 1;
        }
        Ok(out)
    }

    /// Returns the whole decompressed content.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let len = self.len();
        self.read_range(0, len)
    }

    fn block(&mut self, position: usize) -> Result<&[u8]> {
        let hit = matches!(&self.cached, Some(cached) if cached.position == position);
        if !hit {
            let entry = self.index.entries[position];
            let data = self.decompress(position, &entry)?;
            self.cached = Some(CachedBlock { position, data });
        }
        match &self.cached {
            Some(cached) => Ok(&cached.data),
            None => Err(Error::Corrupt("block cache empty after load".to_string())),
        }
    }

    fn decompress(&mut self, position: usize, entry: &BlockEntry) -> Result<Vec<u8>> {
        let mut compressed = vec![0u8; entry.compressed_size as usize];
        self.file
            .seek(SeekFrom::Start(entry.compressed_offset))
            .map_err(Error::at(&self.data_path))?;
        self.file
            .read_exact(&mut compressed)
            .map_err(Error::at(&self.data_path))?;
        let data = zstd::bulk::decompress(&compressed, entry.uncompressed_size as usize)
            .map_err(Error::at(&self.data_path))?;
        if data.len() != entry.uncompressed_size as usize {
            return Err(Error::Corrupt(format!(
                "block {position} of {} decompressed to {} bytes, expected {}",
                self.data_path.display(),
                data.len(),
                entry.uncompressed_size
            )));
        }
        if crc32fast::hash(&data) != entry.crc32 {
            return Err(Error::Corrupt(format!(
                "block {position} of {} failed checksum",
                self.data_path.display()
            )));
        }
        Ok(data)
    }
}
