use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};

/// Size of one boundary record in a segment index file.
pub const SEGMENT_OFFSET_LEN: usize = 8;

/// Appends segment boundaries to an uncompressed `.seg` file.
///
/// The file is a flat list of little-endian u64 decompressed offsets. The
/// start sentinel `0` is written on create; [`finish`] appends the end offset
/// when bytes follow the last boundary.
///
/// [`finish`]: SegmentIndexWriter::finish
pub struct SegmentIndexWriter {
    path: PathBuf,
    out: BufWriter<File>,
    last: u64,
    boundaries: u64,
}

impl SegmentIndexWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::create(&path).map_err(Error::at(&path))?;
        let mut writer = Self {
            path,
            out: BufWriter::new(file),
            last: 0,
            boundaries: 0,
        };
        writer.append(0)?;
        Ok(writer)
    }

    /// Records a boundary at `position`. Returns `false` without writing when
    /// nothing was written since the previous boundary.
    pub fn mark(&mut self, position: u64) -> Result<bool> {
        if position <= self.last {
            return Ok(false);
        }
        self.append(position)?;
        self.last = position;
        self.boundaries += 1;
        Ok(true)
    }

    /// Number of segments closed so far.
    pub fn segments(&self) -> u64 {
        self.boundaries
    }

    /// Closes the trailing segment at `end` and syncs the file.
    pub fn finish(mut self, end: u64) -> Result<u64> {
        self.mark(end)?;
        self.out.flush().map_err(Error::at(&self.path))?;
        self.out.get_ref().sync_all().map_err(Error::at(&self.path))?;
        Ok(self.boundaries)
    }

    fn append(&mut self, offset: u64) -> Result<()> {
        self.out
            .write_all(&offset.to_le_bytes())
            .map_err(Error::at(&self.path))
    }
}

/// A loaded, validated segment index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentIndex {
    offsets: Vec<u64>,
}

impl SegmentIndex {
    /// Loads `path` and checks that it describes `stream_len` bytes.
    pub fn load(path: &Path, stream_len: u64) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(Error::at(path))?;
        let corrupt = |reason| Error::CorruptSegmentIndex {
            path: path.to_path_buf(),
            reason,
        };
        if bytes.len() % SEGMENT_OFFSET_LEN != 0 {
            return Err(corrupt("length is not a whole number of offsets"));
        }
        let offsets: Vec<u64> = bytes
            .chunks_exact(SEGMENT_OFFSET_LEN)
            .map(|chunk| {
                let mut buf = [0u8; SEGMENT_OFFSET_LEN];
                buf.copy_from_slice(chunk);
                u64::from_le_bytes(buf)
            })
            .collect();
        match offsets.first() {
            None => return Err(corrupt("missing start sentinel")),
            Some(&first) if first != 0 => return Err(corrupt("start sentinel is not zero")),
            Some(_) => {}
        }
        if offsets.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(corrupt("boundaries are not strictly increasing"));
        }
        if offsets.last().copied() != Some(stream_len) {
            return Err(corrupt("end boundary does not match stream length"));
        }
        Ok(Self { offsets })
    }

    pub fn count(&self) -> u64 {
        (self.offsets.len() - 1) as u64
    }

    /// Decompressed byte range of `segment`.
    pub fn range(&self, segment: u64) -> Result<(u64, u64)> {
        let count = self.count();
        if segment >= count {
            return Err(Error::SegmentOutOfRange { segment, count });
        }
        let at = segment as usize;
        Ok((self.offsets[at], self.offsets[at + 1]))
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }
}
