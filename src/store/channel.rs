use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::Error;

/// A named byte stream within an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// The primary channel.
    Data,
    Context,
    Meta,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Data, Channel::Context, Channel::Meta];

    pub fn name(self) -> &'static str {
        match self {
            Channel::Data => "data",
            Channel::Context => "context",
            Channel::Meta => "meta",
        }
    }

    /// Suffix used in on-disk file names.
    pub fn file_tag(self) -> &'static str {
        match self {
            Channel::Data => "dat",
            Channel::Context => "ctx",
            Channel::Meta => "meta",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "" | "data" | "dat" => Ok(Channel::Data),
            "context" | "ctx" => Ok(Channel::Context),
            "meta" => Ok(Channel::Meta),
            other => Err(Error::InvalidArgument(format!("unknown channel {other}"))),
        }
    }
}
