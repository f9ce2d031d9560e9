use std::path::PathBuf;

use thiserror::Error;

use crate::exchange::ExchangeKind;
use crate::meta::Status;

#[derive(Debug, Error)]
pub enum Error {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage io error at {}: {source}", path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("corrupt segment index {}: {reason}", path.display())]
    CorruptSegmentIndex { path: PathBuf, reason: &'static str },
    #[error("range {start}..{end} outside stream of {len} bytes")]
    InvalidRange { start: u64, end: u64, len: u64 },
    #[error("segment {segment} out of range ({count} segments)")]
    SegmentOutOfRange { segment: u64, count: u64 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("meta {id} status conflict: expected {expected}, found {actual}")]
    StatusConflict {
        id: u64,
        expected: Status,
        actual: Status,
    },
    #[error("meta {id} cannot move from {from} to {to}")]
    InvalidTransition { id: u64, from: Status, to: Status },
    #[error("malformed archive: {0}")]
    MalformedArchive(String),
    #[error("duplicate archive entry: {0}")]
    DuplicateEntry(String),
    #[error("archive entry {base_name} has no {kind} member")]
    MissingRequiredEntry {
        base_name: String,
        kind: ExchangeKind,
    },
    #[error("no available volume")]
    NoAvailableVolume,
    #[error("catalog error: {0}")]
    Catalog(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an I/O error with the path it occurred on.
    pub fn at(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Error {
        let path = path.into();
        move |source| Error::StorageIo { path, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(value: zip::result::ZipError) -> Self {
        match value {
            zip::result::ZipError::Io(err) => Error::Io(err),
            other => Error::MalformedArchive(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
