use std::fmt;

use serde::{Deserialize, Serialize};

use crate::store::Channel;

/// The member kinds of an exchange archive group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExchangeKind {
    Manifest,
    Data,
    Context,
    Meta,
}

impl ExchangeKind {
    pub const ALL: [ExchangeKind; 4] = [
        ExchangeKind::Manifest,
        ExchangeKind::Meta,
        ExchangeKind::Context,
        ExchangeKind::Data,
    ];

    /// File name suffix of this kind inside the archive.
    pub fn extension(self) -> &'static str {
        match self {
            ExchangeKind::Manifest => ".mf",
            ExchangeKind::Data => ".dat",
            ExchangeKind::Context => ".ctx",
            ExchangeKind::Meta => ".meta",
        }
    }
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ExchangeKind::Manifest => "MANIFEST",
            ExchangeKind::Data => "DATA",
            ExchangeKind::Context => "CONTEXT",
            ExchangeKind::Meta => "META",
        })
    }
}

impl From<Channel> for ExchangeKind {
    fn from(channel: Channel) -> Self {
        match channel {
            Channel::Data => ExchangeKind::Data,
            Channel::Context => ExchangeKind::Context,
            Channel::Meta => ExchangeKind::Meta,
        }
    }
}

/// One member of an exchange archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExchangeEntryKey {
    pub base_name: String,
    pub kind: ExchangeKind,
}

impl ExchangeEntryKey {
    pub fn new(base_name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            base_name: base_name.into(),
            kind,
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}{}", self.base_name, self.kind.extension())
    }

    /// Splits an archive member name into base name and kind. Names without
    /// a known suffix are data members named after the whole file.
    pub fn parse(file_name: &str) -> Self {
        for kind in ExchangeKind::ALL {
            if let Some(base) = file_name.strip_suffix(kind.extension()) {
                if !base.is_empty() {
                    return Self::new(base, kind);
                }
            }
        }
        Self::new(file_name, ExchangeKind::Data)
    }
}

impl fmt::Display for ExchangeEntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Base name of a standalone group: the zero-padded ordinal.
pub fn flat_base_name(ordinal: u64) -> String {
    format!("{ordinal:03}")
}

/// Base name of child `child` within group `parent`.
pub fn nested_base_name(parent: u64, child: u64) -> String {
    format!("{parent:03}_{child}")
}

/// A base name split into the group it belongs to and its position there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseName {
    pub group: String,
    pub child: Option<u64>,
}

impl BaseName {
    pub fn parse(base_name: &str) -> Self {
        if let Some((parent, child)) = base_name.rsplit_once('_') {
            if !parent.is_empty() && parent.bytes().all(|b| b.is_ascii_digit()) {
                if let Ok(child) = child.parse::<u64>() {
                    return Self {
                        group: parent.to_string(),
                        child: Some(child),
                    };
                }
            }
        }
        Self {
            group: base_name.to_string(),
            child: None,
        }
    }

    pub fn key(&self) -> GroupKey {
        GroupKey {
            name: self.group.clone(),
            nested: self.child.is_some(),
        }
    }
}

/// Identifies one uploaded stream. Children of a parent share a key; a flat
/// base name never joins them, even when it equals the parent ordinal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub name: String,
    pub nested: bool,
}
