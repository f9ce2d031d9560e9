use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use crate::core::{Error, Result};
use crate::meta::{Meta, MetaProperties};
use crate::store::{Channel, Store};

use super::archive::{ExchangeGroup, ExchangeReader};
use super::attributes::{self, append_line_block, AttributeMap};
use super::key::{BaseName, GroupKey};

#[derive(Debug, Clone, Default)]
pub struct UploadOptions {
    /// Overrides the feed recorded in the archive.
    pub feed_name: Option<String>,
    /// Overrides the type recorded in the archive.
    pub type_name: Option<String>,
    /// Recorded as an `UploadedBy` line in every uploaded META channel.
    pub uploaded_by: String,
    /// Extra `Key:Value` lines appended to every uploaded META channel.
    pub extra_meta: Option<String>,
}

impl UploadOptions {
    pub fn new(uploaded_by: impl Into<String>) -> Self {
        Self {
            uploaded_by: uploaded_by.into(),
            ..Self::default()
        }
    }

    pub fn feed(mut self, feed_name: impl Into<String>) -> Self {
        self.feed_name = Some(feed_name.into());
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    pub fn extra_meta(mut self, extra_meta: impl Into<String>) -> Self {
        self.extra_meta = Some(extra_meta.into());
        self
    }
}

/// A group that was skipped, and why.
#[derive(Debug)]
pub struct UploadFailure {
    pub base_name: String,
    pub error: Error,
}

#[derive(Debug, Default)]
pub struct UploadSummary {
    /// One committed Meta per uploaded group, in archive order.
    pub created: Vec<Meta>,
    pub failures: Vec<UploadFailure>,
}

impl UploadSummary {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

struct PendingGroup {
    key: String,
    members: Vec<(String, ExchangeGroup)>,
    manifest: Option<AttributeMap>,
}

/// Loads `archive` into new Metas.
///
/// Base names sharing a parent ordinal (`{p}_{c}`) form one group and become
/// one Meta with an entry per child, in ascending child order; any other
/// base name, including a flat `{p}` next to `{p}_{c}` members, is a group
/// of its own. Groups with a missing DATA member or an
/// undecodable MANIFEST are reported in `failures` and do not stop the
/// remaining groups. I/O and storage errors abort the upload.
pub fn upload(store: &Store, archive: &Path, options: &UploadOptions) -> Result<UploadSummary> {
    let mut reader = ExchangeReader::open(archive)?;
    let mut grouped: BTreeMap<GroupKey, Vec<(Option<u64>, String)>> = BTreeMap::new();
    for base_name in reader.base_names() {
        let parsed = BaseName::parse(&base_name);
        grouped
            .entry(parsed.key())
            .or_default()
            .push((parsed.child, base_name));
    }

    let mut summary = UploadSummary::default();
    for (key, mut members) in grouped {
        members.sort();
        let pending = match load_group(&mut reader, key.name, members) {
            Ok(pending) => pending,
            Err((base_name, error)) if is_group_error(&error) => {
                log::warn!("skipping archive group {base_name}: {error}");
                summary.failures.push(UploadFailure { base_name, error });
                continue;
            }
            Err((_, error)) => return Err(error),
        };
        match store_group(store, &pending, options) {
            Ok(meta) => summary.created.push(meta),
            Err(error) if is_group_error(&error) => {
                log::warn!("skipping archive group {}: {error}", pending.key);
                summary.failures.push(UploadFailure {
                    base_name: pending.key,
                    error,
                });
            }
            Err(error) => return Err(error),
        }
    }
    log::info!(
        "uploaded {}: {} metas created, {} groups failed",
        archive.display(),
        summary.created.len(),
        summary.failures.len()
    );
    Ok(summary)
}

fn is_group_error(error: &Error) -> bool {
    matches!(
        error,
        Error::MalformedArchive(_) | Error::MissingRequiredEntry { .. }
    )
}

fn load_group(
    reader: &mut ExchangeReader,
    key: String,
    members: Vec<(Option<u64>, String)>,
) -> std::result::Result<PendingGroup, (String, Error)> {
    let mut pending = PendingGroup {
        key,
        members: Vec::with_capacity(members.len()),
        manifest: None,
    };
    for (_, base_name) in members {
        let group = match reader.read(&base_name) {
            Ok(group) => group,
            Err(error) => return Err((base_name, error)),
        };
        if pending.manifest.is_none() {
            if let Some(bytes) = &group.manifest {
                match AttributeMap::parse(bytes) {
                    Ok(manifest) => pending.manifest = Some(manifest),
                    Err(error) => return Err((base_name, error)),
                }
            }
        }
        pending.members.push((base_name, group));
    }
    Ok(pending)
}

fn store_group(store: &Store, pending: &PendingGroup, options: &UploadOptions) -> Result<Meta> {
    let first_meta = pending
        .members
        .first()
        .and_then(|(_, group)| group.meta.as_deref())
        .map(AttributeMap::parse_lossy)
        .unwrap_or_default();
    let lookup = |explicit: &Option<String>, name: &str| {
        explicit
            .clone()
            .or_else(|| pending.manifest.as_ref().and_then(|m| m.get(name)).map(str::to_string))
            .or_else(|| first_meta.get(name).map(str::to_string))
            .filter(|value| !value.is_empty())
    };
    let feed = lookup(&options.feed_name, attributes::FEED)
        .ok_or_else(|| Error::MalformedArchive(format!("group {} names no feed", pending.key)))?;
    let type_name = lookup(&options.type_name, attributes::TYPE)
        .ok_or_else(|| Error::MalformedArchive(format!("group {} names no type", pending.key)))?;

    let mut properties = MetaProperties::new(feed, type_name);
    if let Some(effective) = pending
        .manifest
        .as_ref()
        .and_then(|m| m.get(attributes::EFFECTIVE_TIME))
    {
        let effective = effective.parse::<u64>().map_err(|err| {
            Error::MalformedArchive(format!(
                "group {} has bad {}: {err}",
                pending.key,
                attributes::EFFECTIVE_TIME
            ))
        })?;
        properties = properties.effective_at(effective);
    }

    let mut target = store.open_target(properties)?;
    for (_, group) in &pending.members {
        let mut entry = target.next_entry()?;
        entry.primary()?.write_all(&group.data)?;
        if let Some(context) = &group.context {
            entry.channel(Channel::Context)?.write_all(context)?;
        }
        let meta = compose_meta(
            group.meta.as_deref(),
            &options.uploaded_by,
            options.extra_meta.as_deref(),
        );
        entry.channel(Channel::Meta)?.write_all(&meta)?;
        entry.close()?;
    }
    let meta = target.close()?;
    log::info!(
        "archive group {} uploaded as meta {} ({} entries)",
        pending.key,
        meta.id,
        pending.members.len()
    );
    Ok(meta)
}

/// META channel of an uploaded entry: the archived META, then the uploader
/// line, then the caller's extra lines, each newline terminated.
pub fn compose_meta(existing: Option<&[u8]>, uploaded_by: &str, extra: Option<&str>) -> Vec<u8> {
    let mut out = Vec::new();
    if let Some(existing) = existing {
        append_line_block(&mut out, existing);
    }
    append_line_block(
        &mut out,
        format!("{}:{uploaded_by}", attributes::UPLOADED_BY).as_bytes(),
    );
    if let Some(extra) = extra {
        append_line_block(&mut out, extra.as_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_is_composed_in_order() {
        let meta = compose_meta(Some(b"META:1\nX:1"), "alice", Some("Z:ALL\n"));
        assert_eq!(meta, b"META:1\nX:1\nUploadedBy:alice\nZ:ALL\n");
        assert_eq!(compose_meta(None, "bob", None), b"UploadedBy:bob\n");
    }
}
