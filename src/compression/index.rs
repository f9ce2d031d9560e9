//! On-disk block index for block-compressed files.
//!
//! Layout (little-endian):
//!
//! ```text
//! header (32 bytes): magic u32 | version u32 | block_size u32 | reserved u32 | block_count u64 | reserved u64
//! entry  (32 bytes): compressed_offset u64 | uncompressed_offset u64
//!                    | compressed_size u32 | uncompressed_size u32 | crc32 u32 | reserved u32
//! ```

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use crate::core::{Error, Result};

pub const BLOCK_INDEX_MAGIC: u32 = 0x314B_4C42; // 'BLK1'
pub const BLOCK_INDEX_VERSION: u32 = 1;
pub const BLOCK_INDEX_HEADER_LEN: usize = 32;
pub const BLOCK_INDEX_ENTRY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockEntry {
    pub compressed_offset: u64,
    pub uncompressed_offset: u64,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
}

impl BlockEntry {
    pub fn uncompressed_end(&self) -> u64 {
        self.uncompressed_offset + self.uncompressed_size as u64
    }

    fn encode(&self) -> [u8; BLOCK_INDEX_ENTRY_LEN] {
        let mut buf = [0u8; BLOCK_INDEX_ENTRY_LEN];
        buf[0..8].copy_from_slice(&self.compressed_offset.to_le_bytes());
        buf[8..16].copy_from_slice(&self.uncompressed_offset.to_le_bytes());
        buf[16..20].copy_from_slice(&self.compressed_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.uncompressed_size.to_le_bytes());
        buf[24..28].copy_from_slice(&self.crc32.to_le_bytes());
        buf
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            compressed_offset: read_u64(buf, 0),
            uncompressed_offset: read_u64(buf, 8),
            compressed_size: read_u32(buf, 16),
            uncompressed_size: read_u32(buf, 20),
            crc32: read_u32(buf, 24),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    pub block_size: u32,
    pub entries: Vec<BlockEntry>,
}

impl BlockIndex {
    pub fn new(block_size: u32) -> Self {
        Self {
            block_size,
            entries: Vec::new(),
        }
    }

    /// Total number of uncompressed bytes covered by the index.
    pub fn uncompressed_len(&self) -> u64 {
        self.entries.last().map_or(0, BlockEntry::uncompressed_end)
    }

    /// Position of the block containing uncompressed `offset`, if any.
    pub fn position_for_offset(&self, offset: u64) -> Option<usize> {
        if offset >= self.uncompressed_len() {
            return None;
        }
        let pos = self
            .entries
            .partition_point(|entry| entry.uncompressed_end() <= offset);
        (pos < self.entries.len()).then_some(pos)
    }

    pub fn entry_for_offset(&self, offset: u64) -> Option<&BlockEntry> {
        self.position_for_offset(offset).map(|pos| &self.entries[pos])
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(Error::at(path))?;
        let mut out = BufWriter::new(file);
        let mut header = [0u8; BLOCK_INDEX_HEADER_LEN];
        header[0..4].copy_from_slice(&BLOCK_INDEX_MAGIC.to_le_bytes());
        header[4..8].copy_from_slice(&BLOCK_INDEX_VERSION.to_le_bytes());
        header[8..12].copy_from_slice(&self.block_size.to_le_bytes());
        header[16..24].copy_from_slice(&(self.entries.len() as u64).to_le_bytes());
        out.write_all(&header).map_err(Error::at(path))?;
        for entry in &self.entries {
            out.write_all(&entry.encode()).map_err(Error::at(path))?;
        }
        let file = out
            .into_inner()
            .map_err(|err| Error::at(path)(err.into_error()))?;
        file.sync_all().map_err(Error::at(path))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let mut file = File::open(path).map_err(Error::at(path))?;
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).map_err(Error::at(path))?;
        Self::decode(&buf)
    }

    fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < BLOCK_INDEX_HEADER_LEN {
            return Err(Error::Corrupt("block index shorter than header".to_string()));
        }
        let magic = read_u32(buf, 0);
        if magic != BLOCK_INDEX_MAGIC {
            return Err(Error::Corrupt("block index magic mismatch".to_string()));
        }
        let version = read_u32(buf, 4);
        if version != BLOCK_INDEX_VERSION {
            return Err(Error::Corrupt(format!(
                "unsupported block index version {version}"
            )));
        }
        let block_size = read_u32(buf, 8);
        let block_count = read_u64(buf, 16);
        let body = &buf[BLOCK_INDEX_HEADER_LEN..];
        if body.len() % BLOCK_INDEX_ENTRY_LEN != 0
            || (body.len() / BLOCK_INDEX_ENTRY_LEN) as u64 != block_count
        {
            return Err(Error::Corrupt(format!(
                "block index declares {block_count} blocks but holds {} bytes of entries",
                body.len()
            )));
        }

        let mut entries = Vec::with_capacity(block_count as usize);
        let mut expected_uncompressed = 0u64;
        let mut expected_compressed = 0u64;
        for chunk in body.chunks_exact(BLOCK_INDEX_ENTRY_LEN) {
            let entry = BlockEntry::decode(chunk);
            if entry.uncompressed_offset != expected_uncompressed
                || entry.compressed_offset != expected_compressed
            {
                return Err(Error::Corrupt("block index entries are not contiguous".to_string()));
            }
            if entry.uncompressed_size > block_size {
                return Err(Error::Corrupt(format!(
                    "block index entry of {} bytes exceeds block size {block_size}",
                    entry.uncompressed_size
                )));
            }
            expected_uncompressed = entry.uncompressed_end();
            expected_compressed = entry.compressed_offset + entry.compressed_size as u64;
            entries.push(entry);
        }
        Ok(Self {
            block_size,
            entries,
        })
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(bytes)
}

fn read_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}
