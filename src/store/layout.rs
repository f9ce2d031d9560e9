//! On-disk layout of a container.
//!
//! ```text
//! {volume}/{type}/{feed}/{meta_id:012}/
//!     container.json            written on commit
//!     000001.dat.zst            entry 1, data channel blocks
//!     000001.dat.zst.idx        block index
//!     000001.dat.seg            segment index
//!     000001.ctx.zst ...
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::meta::{Meta, MetaId};

use super::channel::Channel;

pub const CONTAINER_MANIFEST: &str = "container.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerLayout {
    dir: PathBuf,
}

impl ContainerLayout {
    pub fn new(volume_root: &Path, meta: &Meta) -> Self {
        let dir = volume_root
            .join(sanitize(&meta.type_name))
            .join(sanitize(&meta.feed_name))
            .join(format!("{:012}", meta.id));
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(CONTAINER_MANIFEST)
    }

    pub fn channel_paths(&self, ordinal: u32, channel: Channel) -> ChannelPaths {
        let stem = format!("{ordinal:06}.{}", channel.file_tag());
        ChannelPaths {
            data: self.dir.join(format!("{stem}.zst")),
            block_index: self.dir.join(format!("{stem}.zst.idx")),
            segment_index: self.dir.join(format!("{stem}.seg")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPaths {
    pub data: PathBuf,
    pub block_index: PathBuf,
    pub segment_index: PathBuf,
}

/// Committed contents of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerManifest {
    pub meta_id: MetaId,
    pub entries: Vec<EntryManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryManifest {
    /// 1-based entry number.
    pub ordinal: u32,
    pub channels: Vec<ChannelManifest>,
}

impl EntryManifest {
    pub fn channel(&self, channel: Channel) -> Option<&ChannelManifest> {
        self.channels.iter().find(|c| c.channel == channel)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelManifest {
    pub channel: Channel,
    pub segments: u64,
    pub uncompressed_len: u64,
    pub compressed_len: u64,
}

/// Maps a feed or type name onto a single safe path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => format!("_{cleaned}"),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meta::Status;

    fn meta(feed: &str, type_name: &str) -> Meta {
        Meta {
            id: 42,
            feed_name: feed.to_string(),
            type_name: type_name.to_string(),
            parent_meta_id: None,
            processor_id: None,
            processor_task_id: None,
            pipeline_id: None,
            created_at_ms: 0,
            effective_at_ms: None,
            status_changed_at_ms: 0,
            status: Status::Locked,
        }
    }

    #[test]
    fn container_dir_is_deterministic_and_safe() {
        let layout = ContainerLayout::new(Path::new("/vol"), &meta("TEST/FEED", "Raw Events"));
        assert_eq!(
            layout.dir(),
            Path::new("/vol/Raw_Events/TEST_FEED/000000000042")
        );
        let hostile = ContainerLayout::new(Path::new("/vol"), &meta("..", ""));
        assert_eq!(hostile.dir(), Path::new("/vol/_/_../000000000042"));
    }

    #[test]
    fn channel_files_share_a_stem() {
        let layout = ContainerLayout::new(Path::new("/vol"), &meta("F", "T"));
        let paths = layout.channel_paths(3, Channel::Context);
        assert!(paths.data.ends_with("000003.ctx.zst"));
        assert!(paths.block_index.ends_with("000003.ctx.zst.idx"));
        assert!(paths.segment_index.ends_with("000003.ctx.seg"));
    }
}
