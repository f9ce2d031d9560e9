use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::fsutil::{fsync_dir, write_json_atomic};
use crate::core::{Error, Result};
use crate::meta::{Meta, MetaService, Status};
use crate::segment::SegmentWriter;
use crate::volume::Volume;

use super::channel::Channel;
use super::layout::{ChannelManifest, ContainerLayout, ContainerManifest, EntryManifest};

/// Write handle for one (entry, channel) pair.
pub type ChannelWriter = SegmentWriter;

/// Write side of one Meta's container.
///
/// Every Target owns a freshly minted Meta, so no other writer can ever
/// touch its container. [`close`] commits the container and unlocks the
/// Meta; a Target dropped without closing leaves the Meta LOCKED.
///
/// [`close`]: Target::close
pub struct Target {
    meta: Meta,
    meta_service: Arc<MetaService>,
    volume: Volume,
    layout: ContainerLayout,
    block_size: usize,
    compression_level: i32,
    entries: Vec<EntryManifest>,
    failed: Option<u32>,
    closed: bool,
}

impl Target {
    pub(crate) fn create(
        meta: Meta,
        meta_service: Arc<MetaService>,
        volume: Volume,
        block_size: usize,
        compression_level: i32,
    ) -> Result<Self> {
        let layout = ContainerLayout::new(&volume.path, &meta);
        std::fs::create_dir_all(layout.dir()).map_err(Error::at(layout.dir()))?;
        log::debug!(
            "opened target for meta {} at {}",
            meta.id,
            layout.dir().display()
        );
        Ok(Self {
            meta,
            meta_service,
            volume,
            layout,
            block_size,
            compression_level,
            entries: Vec::new(),
            failed: None,
            closed: false,
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn layout(&self) -> &ContainerLayout {
        &self.layout
    }

    /// Entries finalized so far.
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Starts the next entry. The previous entry must have been closed or
    /// dropped, which the borrow on `self` enforces.
    pub fn next_entry(&mut self) -> Result<EntryWriter<'_>> {
        if let Some(ordinal) = self.failed {
            return Err(self.failure(ordinal));
        }
        let ordinal = self.entries.len() as u32 + 1;
        Ok(EntryWriter {
            target: self,
            ordinal,
            channels: BTreeMap::new(),
            closed: false,
        })
    }

    /// Publishes the container manifest and moves the Meta to UNLOCKED.
    pub fn close(mut self) -> Result<Meta> {
        if let Some(ordinal) = self.failed {
            return Err(self.failure(ordinal));
        }
        let manifest = ContainerManifest {
            meta_id: self.meta.id,
            entries: std::mem::take(&mut self.entries),
        };
        let entry_count = manifest.entries.len();
        write_json_atomic(&self.layout.manifest_path(), &manifest)?;
        fsync_dir(self.layout.dir())?;
        let meta = self
            .meta_service
            .update_status(&self.meta, Status::Locked, Status::Unlocked)?;
        self.closed = true;
        log::info!(
            "committed meta {} ({} entries) on {}",
            meta.id,
            entry_count,
            self.volume.path.display()
        );
        Ok(meta)
    }

    fn failure(&self, ordinal: u32) -> Error {
        Error::Corrupt(format!(
            "target for meta {} failed while finalizing entry {ordinal}",
            self.meta.id
        ))
    }
}

impl Drop for Target {
    fn drop(&mut self) {
        if !self.closed {
            log::warn!(
                "target for meta {} dropped before close; meta stays LOCKED",
                self.meta.id
            );
        }
    }
}

/// Channel provider for the entry being written.
///
/// Channels are opened lazily on first use and finalized together when the
/// entry is closed or dropped.
pub struct EntryWriter<'t> {
    target: &'t mut Target,
    ordinal: u32,
    channels: BTreeMap<Channel, ChannelWriter>,
    closed: bool,
}

impl EntryWriter<'_> {
    /// 1-based entry number.
    pub fn ordinal(&self) -> u32 {
        self.ordinal
    }

    pub fn primary(&mut self) -> Result<&mut ChannelWriter> {
        self.channel(Channel::Data)
    }

    pub fn channel(&mut self, channel: Channel) -> Result<&mut ChannelWriter> {
        match self.channels.entry(channel) {
            Entry::Occupied(open) => Ok(open.into_mut()),
            Entry::Vacant(slot) => {
                let paths = self.target.layout.channel_paths(self.ordinal, channel);
                let writer = SegmentWriter::create(
                    &paths.data,
                    &paths.block_index,
                    &paths.segment_index,
                    self.target.block_size,
                    self.target.compression_level,
                )?;
                Ok(slot.insert(writer))
            }
        }
    }

    /// Finalizes every channel of this entry.
    pub fn close(mut self) -> Result<()> {
        self.finalize()
    }

    fn finalize(&mut self) -> Result<()> {
        self.closed = true;
        let mut channels = Vec::with_capacity(self.channels.len());
        for (channel, writer) in std::mem::take(&mut self.channels) {
            match writer.finish() {
                Ok(summary) => channels.push(ChannelManifest {
                    channel,
                    segments: summary.segments,
                    uncompressed_len: summary.uncompressed_len,
                    compressed_len: summary.compressed_len,
                }),
                Err(err) => {
                    self.target.failed = Some(self.ordinal);
                    return Err(err);
                }
            }
        }
        log::debug!(
            "meta {} entry {} finalized with {} channels",
            self.target.meta.id,
            self.ordinal,
            channels.len()
        );
        self.target.entries.push(EntryManifest {
            ordinal: self.ordinal,
            channels,
        });
        Ok(())
    }
}

impl Drop for EntryWriter<'_> {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.finalize() {
                log::error!(
                    "meta {} entry {} failed to finalize on drop: {err}",
                    self.target.meta.id,
                    self.ordinal
                );
            }
        }
    }
}
