//! Segment-indexed, block-compressed storage for append-only event streams.
//!
//! Every logical stream is a [`meta::Meta`] in the catalog. Its bytes live in
//! a container on one volume: numbered entries, each with a data channel and
//! optional context and meta channels. Channels are zstd block files with a
//! segment index, so any subset of records can be read back without
//! decompressing the rest. Whole streams move between stores as zip
//! archives (see [`exchange`]).

pub mod compression;
pub mod config;
pub mod core;
pub mod exchange;
pub mod lifecycle;
pub mod meta;
pub mod segment;
pub mod store;
pub mod volume;

pub use crate::config::StoreConfig;
pub use crate::core::{Error, Result};
pub use crate::meta::{Criteria, Meta, MetaId, MetaProperties, MetaService, Status};
pub use crate::store::{Channel, Source, Store, Target};
