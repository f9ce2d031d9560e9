//! Block-compressed files.
//!
//! A channel's bytes are cut into fixed-size blocks, each compressed as an
//! independent zstd frame and appended to a `.zst` data file. A companion
//! `.zst.idx` file records where every block starts in both the compressed
//! and the decompressed byte space, so a reader can jump straight to the
//! blocks covering any decompressed range.
//!
//! # Usage
//!
//! ```rust,ignore
//! use feedstore::compression::{BlockReader, BlockWriter};
//!
//! let mut writer = BlockWriter::create("000001.dat.zst", "000001.dat.zst.idx", 64 * 1024, 3)?;
//! writer.write_bytes(b"hello")?;
//! writer.finish()?;
//!
//! let mut reader = BlockReader::open("000001.dat.zst", "000001.dat.zst.idx")?;
//! assert_eq!(reader.read_range(1, 4)?, b"ell");
//! ```

mod index;
mod reader;
mod writer;

pub use index::{
    BlockEntry, BlockIndex, BLOCK_INDEX_ENTRY_LEN, BLOCK_INDEX_HEADER_LEN, BLOCK_INDEX_MAGIC,
    BLOCK_INDEX_VERSION,
};
pub use reader::BlockReader;
pub use writer::{BlockFileSummary, BlockWriter, DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_LEVEL};
pub(crate) use writer::into_io;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Error;
    use std::io::Write;
    use tempfile::tempdir;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn ranges_spanning_blocks_read_back() {
        let dir = tempdir().expect("tempdir");
        let data_path = dir.path().join("chan.zst");
        let idx_path = dir.path().join("chan.zst.idx");
        let data = pattern(1000);

        let mut writer = BlockWriter::create(&data_path, &idx_path, 64, 3).expect("create");
        writer.write_all(&data[..10]).expect("write head");
        writer.write_all(&data[10..]).expect("write tail");
        let summary = writer.finish().expect("finish");
        assert_eq!(summary.blocks, 16);
        assert_eq!(summary.uncompressed_len, 1000);

        let mut reader = BlockReader::open(&data_path, &idx_path).expect("open");
        assert_eq!(reader.len(), 1000);
        assert_eq!(reader.block_count(), 16);
        for (start, end) in [(0u64, 1u64), (63, 65), (64, 128), (100, 900), (999, 1000), (0, 1000)] {
            let got = reader.read_range(start, end).expect("range");
            assert_eq!(&got[..], &data[start as usize..end as usize], "{start}..{end}");
        }
        assert!(reader.read_range(5, 5).expect("empty").is_empty());
        assert!(matches!(
            reader.read_range(10, 1001),
            Err(Error::InvalidRange { .. })
        ));
    }

    #[test]
    fn empty_stream_has_no_blocks() {
        let dir = tempdir().expect("tempdir");
        let data_path = dir.path().join("empty.zst");
        let idx_path = dir.path().join("empty.zst.idx");
        let writer = BlockWriter::create(&data_path, &idx_path, 64, 3).expect("create");
        let summary = writer.finish().expect("finish");
        assert_eq!(summary.blocks, 0);

        let mut reader = BlockReader::open(&data_path, &idx_path).expect("open");
        assert!(reader.is_empty());
        assert!(reader.read_all().expect("read").is_empty());
    }

    #[test]
    fn damaged_block_fails_checksum_or_decode() {
        let dir = tempdir().expect("tempdir");
        let data_path = dir.path().join("chan.zst");
        let idx_path = dir.path().join("chan.zst.idx");
        let mut writer = BlockWriter::create(&data_path, &idx_path, 128, 3).expect("create");
        writer.write_bytes(&pattern(512)).expect("write");
        writer.finish().expect("finish");

        let mut bytes = std::fs::read(&data_path).expect("read data");
        let last = bytes.len() - 6;
        bytes[last] ^= 0xFF;
        std::fs::write(&data_path, &bytes).expect("rewrite data");

        let mut reader = BlockReader::open(&data_path, &idx_path).expect("open");
        assert!(reader.read_range(0, 10).is_ok());
        assert!(reader.read_range(500, 512).is_err());
    }
}
