use crate::core::{Error, Result};
use crate::meta::Meta;
use crate::segment::SegmentReader;

use super::channel::Channel;
use super::layout::{ContainerLayout, ContainerManifest, EntryManifest};

/// Read handle for one (entry, channel) pair.
pub type ChannelReader = SegmentReader;

/// Read side of a committed container.
///
/// Holds only the parsed manifest; channel files are opened per read handle
/// and closed when that handle is dropped.
#[derive(Debug)]
pub struct Source {
    meta: Meta,
    layout: ContainerLayout,
    manifest: ContainerManifest,
}

impl Source {
    pub(crate) fn open(meta: Meta, layout: ContainerLayout) -> Result<Self> {
        let path = layout.manifest_path();
        let bytes = std::fs::read(&path).map_err(Error::at(&path))?;
        let manifest: ContainerManifest = serde_json::from_slice(&bytes)?;
        if manifest.meta_id != meta.id {
            return Err(Error::Corrupt(format!(
                "container {} belongs to meta {}, not {}",
                layout.dir().display(),
                manifest.meta_id,
                meta.id
            )));
        }
        Ok(Self {
            meta,
            layout,
            manifest,
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn layout(&self) -> &ContainerLayout {
        &self.layout
    }

    /// Number of committed entries.
    pub fn entry_count(&self) -> usize {
        self.manifest.entries.len()
    }

    /// Entry `index` (0-based).
    pub fn entry(&self, index: usize) -> Result<EntryReader<'_>> {
        let manifest = self.manifest.entries.get(index).ok_or_else(|| {
            Error::NotFound(format!(
                "entry {index} of meta {} ({} entries)",
                self.meta.id,
                self.entry_count()
            ))
        })?;
        Ok(EntryReader {
            source: self,
            manifest,
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = EntryReader<'_>> {
        self.manifest.entries.iter().map(move |manifest| EntryReader {
            source: self,
            manifest,
        })
    }
}

/// Channel provider for one committed entry.
#[derive(Debug, Clone, Copy)]
pub struct EntryReader<'s> {
    source: &'s Source,
    manifest: &'s EntryManifest,
}

impl EntryReader<'_> {
    /// 1-based entry number.
    pub fn ordinal(&self) -> u32 {
        self.manifest.ordinal
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.manifest.channels.iter().map(|c| c.channel).collect()
    }

    pub fn has_channel(&self, channel: Channel) -> bool {
        self.manifest.channel(channel).is_some()
    }

    /// Uncompressed bytes across every channel of this entry.
    pub fn uncompressed_len(&self) -> u64 {
        self.manifest
            .channels
            .iter()
            .map(|c| c.uncompressed_len)
            .sum()
    }

    pub fn primary(&self) -> Result<Option<ChannelReader>> {
        self.channel(Channel::Data)
    }

    /// Opens `channel`, or `None` when it was never written for this entry.
    pub fn channel(&self, channel: Channel) -> Result<Option<ChannelReader>> {
        if !self.has_channel(channel) {
            return Ok(None);
        }
        let paths = self
            .source
            .layout
            .channel_paths(self.manifest.ordinal, channel);
        SegmentReader::open(&paths.data, &paths.block_index, &paths.segment_index).map(Some)
    }

    /// Convenience: every byte of `channel`, if present.
    pub fn read_channel(&self, channel: Channel) -> Result<Option<Vec<u8>>> {
        match self.channel(channel)? {
            Some(mut reader) => reader.read().map(Some),
            None => Ok(None),
        }
    }
}
