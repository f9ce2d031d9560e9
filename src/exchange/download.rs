use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::core::{Error, Result};
use crate::meta::{Criteria, Meta, MetaId, Status};
use crate::store::{Channel, Source, Store};

use super::archive::ExchangeWriter;
use super::attributes::{self, AttributeMap};
use super::key::{nested_base_name, ExchangeEntryKey, ExchangeKind};

/// Per-archive output limits. Unset limits never trigger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveLimits {
    pub max_entries: Option<usize>,
    pub max_bytes: Option<u64>,
}

impl ArchiveLimits {
    pub fn unlimited() -> Self {
        Self::default()
    }

    /// True when an archive holding `entries` base names and `bytes`
    /// uncompressed bytes would break a limit.
    pub fn would_exceed(&self, entries: usize, bytes: u64) -> bool {
        self.max_entries.is_some_and(|max| entries > max)
            || self.max_bytes.is_some_and(|max| bytes > max)
    }
}

/// Shared cancellation signal, observed between Metas.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    /// Directory receiving the archives.
    pub output_dir: PathBuf,
    /// Archives are named `{file_stem}_{part:03}.zip`.
    pub file_stem: String,
    pub limits: ArchiveLimits,
}

impl DownloadOptions {
    pub fn new(output_dir: impl Into<PathBuf>, file_stem: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            file_stem: file_stem.into(),
            limits: ArchiveLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ArchiveLimits) -> Self {
        self.limits = limits;
        self
    }

    fn archive_path(&self, part: u32) -> PathBuf {
        archive_name(&self.output_dir, &self.file_stem, part)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadSummary {
    /// Published archives, in the order they were written.
    pub archives: Vec<PathBuf>,
    pub meta_count: usize,
    pub entry_count: usize,
    /// Matching Metas whose container could not be found.
    pub skipped: Vec<MetaId>,
    /// Matching Metas committed without entries; they have no archive group.
    pub empty: Vec<MetaId>,
    pub cancelled: bool,
}

/// Writes every UNLOCKED Meta matching `criteria` into one or more archives.
///
/// Each Meta becomes group `{n:03}` of the current archive, each of its
/// entries a member `{n:03}_{entry}`. Metas without entries are listed in
/// `empty` and take no group number. A new archive is started before a Meta
/// that would push the current one past `options.limits`; a single Meta is
/// never split. `cancel` is checked before each Meta, and archives written
/// up to that point are kept.
pub fn download(
    store: &Store,
    criteria: &Criteria,
    options: &DownloadOptions,
    cancel: &CancelFlag,
) -> Result<DownloadSummary> {
    let selection = criteria.clone().and(Criteria::status(Status::Unlocked));
    let metas = store.meta_service().find(&selection);
    log::info!("download selected {} metas", metas.len());
    std::fs::create_dir_all(&options.output_dir).map_err(Error::at(&options.output_dir))?;

    let mut summary = DownloadSummary::default();
    let mut current: Option<ExchangeWriter> = None;
    let mut part = 0u32;
    let mut group = 0u64;

    for meta in metas {
        if cancel.is_cancelled() {
            log::info!("download cancelled after {} metas", summary.meta_count);
            summary.cancelled = true;
            break;
        }
        let source = match store.open_source(meta.id, false) {
            Ok(source) => source,
            Err(err) if err.is_not_found() => {
                log::warn!("skipping meta {}: {err}", meta.id);
                summary.skipped.push(meta.id);
                continue;
            }
            Err(err) => return Err(err),
        };
        let entries = source.entry_count();
        if entries == 0 {
            log::warn!("skipping meta {}: no entries", meta.id);
            summary.empty.push(meta.id);
            continue;
        }
        let bytes: u64 = source.entries().map(|entry| entry.uncompressed_len()).sum();

        let fits = |writer: &ExchangeWriter| {
            writer.entry_count() == 0
                || !options.limits.would_exceed(
                    writer.entry_count() + entries,
                    writer.bytes_written() + bytes,
                )
        };
        let mut writer = match current.take() {
            Some(writer) if fits(&writer) => writer,
            previous => {
                if let Some(full) = previous {
                    summary.archives.push(full.finish()?);
                }
                part += 1;
                group = 0;
                ExchangeWriter::create(options.archive_path(part))?
            }
        };

        group += 1;
        write_source(&mut writer, group, &source)?;
        current = Some(writer);
        summary.meta_count += 1;
        summary.entry_count += entries;
    }

    if let Some(writer) = current.take() {
        summary.archives.push(writer.finish()?);
    }
    Ok(summary)
}

fn write_source(writer: &mut ExchangeWriter, group: u64, source: &Source) -> Result<()> {
    for (index, entry) in source.entries().enumerate() {
        let base_name = nested_base_name(group, u64::from(entry.ordinal()));
        if index == 0 {
            let key = ExchangeEntryKey::new(base_name.clone(), ExchangeKind::Manifest);
            writer.write_entry(&key, &manifest_for(source.meta()).to_bytes())?;
        }
        for channel in [Channel::Meta, Channel::Context, Channel::Data] {
            let Some(mut reader) = entry.channel(channel)? else {
                continue;
            };
            let key = ExchangeEntryKey::new(base_name.clone(), channel.into());
            writer.write_with(&key, |sink| reader.read_into(sink))?;
        }
    }
    log::debug!(
        "meta {} written as group {group:03} of {}",
        source.meta().id,
        writer.path().display()
    );
    Ok(())
}

/// Attributes describing the Meta a group was downloaded from.
pub fn manifest_for(meta: &Meta) -> AttributeMap {
    let mut map = AttributeMap::new();
    map.insert(attributes::FEED, meta.feed_name.as_str());
    map.insert(attributes::TYPE, meta.type_name.as_str());
    map.insert(attributes::CREATE_TIME, meta.created_at_ms.to_string());
    if let Some(effective) = meta.effective_at_ms {
        map.insert(attributes::EFFECTIVE_TIME, effective.to_string());
    }
    map.insert(attributes::META_ID, meta.id.to_string());
    map
}

/// Output archive paths for a stem, as `download` names them.
pub fn archive_name(output_dir: &Path, file_stem: &str, part: u32) -> PathBuf {
    output_dir.join(format!("{file_stem}_{part:03}.zip"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limits_report_only_when_exceeded() {
        let limits = ArchiveLimits {
            max_entries: Some(2),
            max_bytes: Some(100),
        };
        assert!(!limits.would_exceed(2, 100));
        assert!(limits.would_exceed(3, 0));
        assert!(limits.would_exceed(0, 101));
        assert!(!ArchiveLimits::unlimited().would_exceed(usize::MAX, u64::MAX));
    }

    #[test]
    fn cancel_is_shared_between_clones() {
        let flag = CancelFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn archive_names_are_numbered() {
        let options = DownloadOptions::new("/out", "feed");
        assert_eq!(options.archive_path(2), archive_name(Path::new("/out"), "feed", 2));
        assert_eq!(options.archive_path(2), PathBuf::from("/out/feed_002.zip"));
    }
}
