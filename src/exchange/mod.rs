//! Portable zip archives for moving whole streams between stores.
//!
//! Every entry of every exported Meta becomes a set of archive members that
//! share a base name and differ by suffix:
//!
//! ```text
//! 001_1.mf     Feed/Type/CreateTime/... of the source Meta (first entry only)
//! 001_1.meta   META channel
//! 001_1.ctx    CONTEXT channel
//! 001_1.dat    DATA channel (required)
//! 001_2.meta
//! 001_2.dat
//! 002_1.mf
//! ...
//! ```
//!
//! `001_2` is entry 2 of the first Meta in the archive. Archives produced
//! elsewhere may also use flat names (`001.dat`), each of which uploads as a
//! Meta of its own.

mod archive;
pub mod attributes;
mod download;
mod key;
mod upload;

pub use archive::{ExchangeGroup, ExchangeReader, ExchangeWriter};
pub use attributes::AttributeMap;
pub use download::{
    archive_name, download, manifest_for, ArchiveLimits, CancelFlag, DownloadOptions,
    DownloadSummary,
};
pub use key::{
    flat_base_name, nested_base_name, BaseName, ExchangeEntryKey, ExchangeKind, GroupKey,
};
pub use upload::{compose_meta, upload, UploadFailure, UploadOptions, UploadSummary};
