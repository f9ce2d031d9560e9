//! Multi-stream entry store.
//!
//! A container holds the numbered entries of one Meta. Each entry carries up
//! to three channels (data, context, meta), and each channel is stored as a
//! segment-indexed, block-compressed stream.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::io::Write;
//! use feedstore::meta::MetaProperties;
//! use feedstore::store::Channel;
//!
//! let mut target = store.open_target(MetaProperties::new("FEED", "Raw Events"))?;
//! let mut entry = target.next_entry()?;
//! entry.primary()?.write_all(b"<event/>")?;
//! entry.channel(Channel::Meta)?.write_all(b"Feed:FEED\n")?;
//! entry.close()?;
//! let meta = target.close()?;
//!
//! let source = store.open_source(meta.id, false)?;
//! let data = source.entry(0)?.read_channel(Channel::Data)?;
//! ```

mod channel;
mod layout;
mod source;
mod target;

use std::sync::Arc;

use crate::config::StoreConfig;
use crate::core::{Error, Result};
use crate::meta::{MetaId, MetaProperties, MetaService, Status};
use crate::volume::{VolumeSelector, VolumeSource};

pub use channel::Channel;
pub use layout::{
    ChannelManifest, ChannelPaths, ContainerLayout, ContainerManifest, EntryManifest,
    CONTAINER_MANIFEST,
};
pub use source::{ChannelReader, EntryReader, Source};
pub use target::{ChannelWriter, EntryWriter, Target};

/// Entry point tying the catalog, the volume list and placement together.
pub struct Store {
    config: StoreConfig,
    meta_service: Arc<MetaService>,
    volumes: Arc<dyn VolumeSource>,
    selector: VolumeSelector,
}

impl Store {
    pub fn new(
        config: StoreConfig,
        meta_service: Arc<MetaService>,
        volumes: Arc<dyn VolumeSource>,
    ) -> Self {
        let selector = match config.seed {
            Some(seed) => VolumeSelector::with_seed(config.volume_strategy, seed),
            None => VolumeSelector::new(config.volume_strategy),
        };
        Self {
            config,
            meta_service,
            volumes,
            selector,
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn meta_service(&self) -> &Arc<MetaService> {
        &self.meta_service
    }

    /// Places and opens a new container for a freshly created LOCKED Meta.
    pub fn open_target(&self, properties: MetaProperties) -> Result<Target> {
        let candidates = self.volumes.volumes()?;
        let volume = self.selector.select(&candidates)?.clone();
        let meta = self.meta_service.create(properties)?;
        Target::create(
            meta,
            Arc::clone(&self.meta_service),
            volume,
            self.config.block_size,
            self.config.compression_level,
        )
    }

    /// Opens the committed container of `id` for reading.
    ///
    /// DELETED Metas are reported as `NotFound` unless `allow_any_status` is
    /// set. A Meta whose container was never committed is `NotFound` too.
    pub fn open_source(&self, id: MetaId, allow_any_status: bool) -> Result<Source> {
        let meta = self.meta_service.get(id)?;
        if meta.status == Status::Deleted && !allow_any_status {
            return Err(Error::NotFound(format!("meta {id} is deleted")));
        }
        for volume in self.volumes.volumes()? {
            let layout = ContainerLayout::new(&volume.path, &meta);
            if layout.manifest_path().exists() {
                return Source::open(meta, layout);
            }
        }
        Err(Error::NotFound(format!("committed container for meta {id}")))
    }
}
