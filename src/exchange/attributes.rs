use std::fmt;

use crate::core::{Error, Result};

pub const FEED: &str = "Feed";
pub const TYPE: &str = "Type";
pub const CREATE_TIME: &str = "CreateTime";
pub const EFFECTIVE_TIME: &str = "EffectiveTime";
pub const META_ID: &str = "MetaId";
pub const UPLOADED_BY: &str = "UploadedBy";

/// Ordered `Key:Value` lines with case-insensitive key lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttributeMap {
    entries: Vec<(String, String)>,
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Strict decode: every non-blank line must be `Key:Value` UTF-8.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|err| Error::MalformedArchive(format!("attributes are not utf-8: {err}")))?;
        let mut map = Self::new();
        for (number, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let (key, value) = split_line(line).ok_or_else(|| {
                Error::MalformedArchive(format!("attribute line {} has no key", number + 1))
            })?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// Lenient decode for free-form meta channels: unusable lines are skipped.
    pub fn parse_lossy(bytes: &[u8]) -> Self {
        let text = String::from_utf8_lossy(bytes);
        let mut map = Self::new();
        for (key, value) in text.lines().filter_map(split_line) {
            map.insert(key, value);
        }
        map
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Sets `key`, replacing an existing value in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(&key))
        {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_string().into_bytes()
    }
}

impl fmt::Display for AttributeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (key, value) in &self.entries {
            writeln!(f, "{key}:{value}")?;
        }
        Ok(())
    }
}

fn split_line(line: &str) -> Option<(String, String)> {
    let (key, value) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), value.trim().to_string()))
}

/// Appends `chunk` to `out`, making sure each piece ends with a newline.
pub fn append_line_block(out: &mut Vec<u8>, chunk: &[u8]) {
    if chunk.is_empty() {
        return;
    }
    if !out.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
    out.extend_from_slice(chunk);
    if !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_case_insensitive_and_order_is_kept() {
        let mut map = AttributeMap::parse(b"Feed:F1\r\ntype: Raw Events\n\n").expect("parse");
        assert_eq!(map.get("FEED"), Some("F1"));
        assert_eq!(map.get("Type"), Some("Raw Events"));
        map.insert("feed", "F2");
        map.insert(META_ID, "7");
        assert_eq!(map.to_string(), "Feed:F2\ntype:Raw Events\nMetaId:7\n");
    }

    #[test]
    fn strict_parse_rejects_bare_lines() {
        assert!(matches!(
            AttributeMap::parse(b"Feed:F\njunk\n"),
            Err(Error::MalformedArchive(_))
        ));
        assert!(matches!(
            AttributeMap::parse(&[0xff, b':', b'x']),
            Err(Error::MalformedArchive(_))
        ));
        let lossy = AttributeMap::parse_lossy(b"junk\nFeed:F\n");
        assert_eq!(lossy.len(), 1);
        assert_eq!(lossy.get("feed"), Some("F"));
    }

    #[test]
    fn line_blocks_are_newline_separated() {
        let mut out = Vec::new();
        append_line_block(&mut out, b"A:1");
        append_line_block(&mut out, b"");
        append_line_block(&mut out, b"B:2\n");
        append_line_block(&mut out, b"C:3");
        assert_eq!(out, b"A:1\nB:2\nC:3\n");
    }
}
