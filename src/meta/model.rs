use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::Error;

pub type MetaId = u64;

/// Lifecycle status of a logical stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// Being written by its one Target.
    Locked,
    /// Committed and readable.
    Unlocked,
    /// Logically deleted.
    Deleted,
}

impl Status {
    /// Whether `self -> to` is one of the permitted transitions.
    pub fn can_transition_to(self, to: Status) -> bool {
        matches!(
            (self, to),
            (Status::Locked, Status::Unlocked)
                | (Status::Locked, Status::Deleted)
                | (Status::Unlocked, Status::Deleted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Locked => "LOCKED",
            Status::Unlocked => "UNLOCKED",
            Status::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "LOCKED" => Ok(Status::Locked),
            "UNLOCKED" => Ok(Status::Unlocked),
            "DELETED" => Ok(Status::Deleted),
            other => Err(Error::InvalidArgument(format!("unknown status {other}"))),
        }
    }
}

/// Catalog record for one logical stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meta {
    pub id: MetaId,
    pub feed_name: String,
    pub type_name: String,
    pub parent_meta_id: Option<MetaId>,
    pub processor_id: Option<u64>,
    pub processor_task_id: Option<u64>,
    pub pipeline_id: Option<String>,
    pub created_at_ms: u64,
    pub effective_at_ms: Option<u64>,
    pub status_changed_at_ms: u64,
    pub status: Status,
}

impl Meta {
    /// Effective time, falling back to creation time.
    pub fn effective_or_created_ms(&self) -> u64 {
        self.effective_at_ms.unwrap_or(self.created_at_ms)
    }
}

/// Caller-supplied properties for a new Meta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaProperties {
    pub feed_name: String,
    pub type_name: String,
    pub parent_meta_id: Option<MetaId>,
    pub processor_id: Option<u64>,
    pub processor_task_id: Option<u64>,
    pub pipeline_id: Option<String>,
    /// Overrides the clock when set.
    pub created_at_ms: Option<u64>,
    /// Ignored when a parent is given; the parent's effective time wins.
    pub effective_at_ms: Option<u64>,
}

impl MetaProperties {
    pub fn new(feed_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            feed_name: feed_name.into(),
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn parent(mut self, parent_meta_id: MetaId) -> Self {
        self.parent_meta_id = Some(parent_meta_id);
        self
    }

    pub fn processor(mut self, processor_id: u64, processor_task_id: u64) -> Self {
        self.processor_id = Some(processor_id);
        self.processor_task_id = Some(processor_task_id);
        self
    }

    pub fn pipeline(mut self, pipeline_id: impl Into<String>) -> Self {
        self.pipeline_id = Some(pipeline_id.into());
        self
    }

    pub fn created_at(mut self, created_at_ms: u64) -> Self {
        self.created_at_ms = Some(created_at_ms);
        self
    }

    pub fn effective_at(mut self, effective_at_ms: u64) -> Self {
        self.effective_at_ms = Some(effective_at_ms);
        self
    }
}
