use std::collections::{BTreeMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::core::fsutil::{fsync_dir, publish_no_replace, tmp_path_for};
use crate::core::{Error, Result};

use super::key::{ExchangeEntryKey, ExchangeKind};

/// The channels stored under one base name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeGroup {
    pub manifest: Option<Vec<u8>>,
    pub data: Vec<u8>,
    pub context: Option<Vec<u8>>,
    pub meta: Option<Vec<u8>>,
}

impl ExchangeGroup {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    pub fn with_manifest(mut self, manifest: impl Into<Vec<u8>>) -> Self {
        self.manifest = Some(manifest.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<Vec<u8>>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_meta(mut self, meta: impl Into<Vec<u8>>) -> Self {
        self.meta = Some(meta.into());
        self
    }

    fn members(&self) -> impl Iterator<Item = (ExchangeKind, &[u8])> {
        [
            (ExchangeKind::Manifest, self.manifest.as_deref()),
            (ExchangeKind::Meta, self.meta.as_deref()),
            (ExchangeKind::Context, self.context.as_deref()),
            (ExchangeKind::Data, Some(self.data.as_slice())),
        ]
        .into_iter()
        .filter_map(|(kind, bytes)| bytes.map(|b| (kind, b)))
    }
}

/// Streams entries into a new zip archive.
///
/// Output goes to `{path}.tmp` and is renamed into place by [`finish`]. A
/// writer dropped before finishing removes its temp file.
///
/// [`finish`]: ExchangeWriter::finish
pub struct ExchangeWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    zip: ZipWriter<File>,
    keys: HashSet<ExchangeEntryKey>,
    base_names: HashSet<String>,
    bytes_written: u64,
    finished: bool,
}

impl ExchangeWriter {
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let tmp_path = tmp_path_for(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)
            .map_err(Error::at(&tmp_path))?;
        Ok(Self {
            path,
            tmp_path,
            zip: ZipWriter::new(file),
            keys: HashSet::new(),
            base_names: HashSet::new(),
            bytes_written: 0,
            finished: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes every present channel of `group` under `base_name`.
    pub fn write(&mut self, base_name: &str, group: &ExchangeGroup) -> Result<()> {
        for (kind, bytes) in group.members() {
            self.write_entry(&ExchangeEntryKey::new(base_name, kind), bytes)?;
        }
        Ok(())
    }

    pub fn write_entry(&mut self, key: &ExchangeEntryKey, bytes: &[u8]) -> Result<()> {
        self.write_with(key, |sink| {
            sink.write_all(bytes)?;
            Ok(bytes.len() as u64)
        })?;
        Ok(())
    }

    /// Starts member `key` and lets `fill` stream its content. `fill`
    /// returns the number of bytes it wrote.
    pub fn write_with<F>(&mut self, key: &ExchangeEntryKey, fill: F) -> Result<u64>
    where
        F: FnOnce(&mut dyn Write) -> Result<u64>,
    {
        if self.keys.contains(key) {
            return Err(Error::DuplicateEntry(key.file_name()));
        }
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);
        self.zip.start_file(key.file_name(), options)?;
        self.keys.insert(key.clone());
        self.base_names.insert(key.base_name.clone());
        let written = fill(&mut self.zip)?;
        self.bytes_written += written;
        Ok(written)
    }

    pub fn contains_entry(&self, base_name: &str, kind: ExchangeKind) -> bool {
        self.keys.contains(&ExchangeEntryKey::new(base_name, kind))
    }

    /// Distinct base names written so far.
    pub fn entry_count(&self) -> usize {
        self.base_names.len()
    }

    /// Uncompressed member bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes the central directory and publishes the archive.
    pub fn finish(mut self) -> Result<PathBuf> {
        let file = self.zip.finish()?;
        file.sync_all().map_err(Error::at(&self.tmp_path))?;
        drop(file);
        publish_no_replace(&self.tmp_path, &self.path)?;
        if let Some(parent) = self.path.parent() {
            fsync_dir(parent)?;
        }
        self.finished = true;
        log::info!(
            "wrote archive {} ({} entries, {} bytes)",
            self.path.display(),
            self.base_names.len(),
            self.bytes_written
        );
        Ok(self.path.clone())
    }
}

impl Drop for ExchangeWriter {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = std::fs::remove_file(&self.tmp_path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!(
                    "failed to remove unfinished archive {}: {err}",
                    self.tmp_path.display()
                );
            }
        }
    }
}

/// Random access to the members of an existing archive.
pub struct ExchangeReader {
    path: PathBuf,
    archive: ZipArchive<File>,
    groups: BTreeMap<String, BTreeMap<ExchangeKind, usize>>,
}

impl ExchangeReader {
    /// Opens `path` and indexes its members by base name. A member name that
    /// appears twice fails with `DuplicateEntry`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = File::open(&path).map_err(Error::at(&path))?;
        let mut archive = ZipArchive::new(file)?;
        let mut groups: BTreeMap<String, BTreeMap<ExchangeKind, usize>> = BTreeMap::new();
        for index in 0..archive.len() {
            let member = archive.by_index(index)?;
            if member.is_dir() {
                continue;
            }
            let name = member.name().rsplit('/').next().unwrap_or_default().to_string();
            let key = ExchangeEntryKey::parse(&name);
            let kinds = groups.entry(key.base_name).or_default();
            if kinds.insert(key.kind, index).is_some() {
                return Err(Error::DuplicateEntry(format!(
                    "{name} in {}",
                    path.display()
                )));
            }
        }
        log::debug!("opened archive {} ({} base names)", path.display(), groups.len());
        Ok(Self {
            path,
            archive,
            groups,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base names in lexical order.
    pub fn base_names(&self) -> Vec<String> {
        self.groups.keys().cloned().collect()
    }

    pub fn contains_entry(&self, base_name: &str, kind: ExchangeKind) -> bool {
        self.groups
            .get(base_name)
            .is_some_and(|kinds| kinds.contains_key(&kind))
    }

    pub fn read_entry(&mut self, base_name: &str, kind: ExchangeKind) -> Result<Option<Vec<u8>>> {
        let Some(&index) = self.groups.get(base_name).and_then(|kinds| kinds.get(&kind)) else {
            return Ok(None);
        };
        let mut member = self.archive.by_index(index)?;
        let mut bytes = Vec::with_capacity(member.size() as usize);
        member.read_to_end(&mut bytes)?;
        Ok(Some(bytes))
    }

    /// Reads every channel of `base_name`; DATA is required.
    pub fn read(&mut self, base_name: &str) -> Result<ExchangeGroup> {
        let data = self.read_entry(base_name, ExchangeKind::Data)?.ok_or_else(|| {
            Error::MissingRequiredEntry {
                base_name: base_name.to_string(),
                kind: ExchangeKind::Data,
            }
        })?;
        Ok(ExchangeGroup {
            manifest: self.read_entry(base_name, ExchangeKind::Manifest)?,
            data,
            context: self.read_entry(base_name, ExchangeKind::Context)?,
            meta: self.read_entry(base_name, ExchangeKind::Meta)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn written_groups_read_back() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("out.zip");
        let mut writer = ExchangeWriter::create(&path).expect("create");
        writer
            .write("001_1", &ExchangeGroup::new("D1").with_meta("A:1\n"))
            .expect("write");
        writer
            .write("001_2", &ExchangeGroup::new("D2").with_context("C2"))
            .expect("write");
        assert!(writer.contains_entry("001_1", ExchangeKind::Meta));
        assert!(!writer.contains_entry("001_1", ExchangeKind::Context));
        assert_eq!(writer.entry_count(), 2);
        assert_eq!(writer.bytes_written(), 10);
        writer.finish().expect("finish");
        assert!(!dir.path().join("out.zip.tmp").exists());

        let mut reader = ExchangeReader::open(&path).expect("open");
        assert_eq!(reader.base_names(), vec!["001_1", "001_2"]);
        assert!(reader.contains_entry("001_2", ExchangeKind::Context));
        assert!(!reader.contains_entry("001_2", ExchangeKind::Meta));
        let group = reader.read("001_2").expect("read");
        assert_eq!(group, ExchangeGroup::new("D2").with_context("C2"));
    }

    #[test]
    fn duplicate_member_is_rejected_on_write() {
        let dir = tempdir().expect("tempdir");
        let mut writer = ExchangeWriter::create(dir.path().join("dup.zip")).expect("create");
        let key = ExchangeEntryKey::new("001", ExchangeKind::Data);
        writer.write_entry(&key, b"one").expect("first");
        assert!(matches!(
            writer.write_entry(&key, b"two"),
            Err(Error::DuplicateEntry(_))
        ));
    }

    #[test]
    fn group_without_data_is_missing_required_entry() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nodata.zip");
        let mut writer = ExchangeWriter::create(&path).expect("create");
        writer
            .write_entry(&ExchangeEntryKey::new("001", ExchangeKind::Meta), b"A:1\n")
            .expect("write");
        writer.finish().expect("finish");

        let mut reader = ExchangeReader::open(&path).expect("open");
        match reader.read("001") {
            Err(Error::MissingRequiredEntry { base_name, kind }) => {
                assert_eq!(base_name, "001");
                assert_eq!(kind, ExchangeKind::Data);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unfinished_writer_leaves_nothing_behind() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("abandoned.zip");
        {
            let mut writer = ExchangeWriter::create(&path).expect("create");
            writer.write("001", &ExchangeGroup::new("x")).expect("write");
        }
        assert!(!path.exists());
        assert!(!dir.path().join("abandoned.zip.tmp").exists());
    }

    #[test]
    fn finish_does_not_overwrite_existing_archive() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("taken.zip");
        std::fs::write(&path, b"keep").expect("seed");
        let writer = ExchangeWriter::create(&path).expect("create");
        assert!(writer.finish().is_err());
        assert_eq!(std::fs::read(&path).expect("read"), b"keep");
    }
}
