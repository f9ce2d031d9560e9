use std::collections::BTreeSet;

use crate::core::{Error, Result};

/// Accumulated include/exclude requests over a channel's segments.
///
/// With no `include` calls every segment not explicitly excluded is
/// selected. Once anything is included, only included segments are selected
/// and excludes are ignored, so a segment both included and excluded is read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentSelection {
    include: BTreeSet<u64>,
    exclude: BTreeSet<u64>,
}

impl SegmentSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn include(&mut self, segment: u64) {
        self.include.insert(segment);
    }

    pub fn exclude(&mut self, segment: u64) {
        self.exclude.insert(segment);
    }

    /// Drops every include and exclude, selecting all segments again.
    pub fn include_all(&mut self) {
        self.include.clear();
        self.exclude.clear();
    }

    pub fn is_default(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Selected segment numbers in ascending order for a channel holding
    /// `count` segments.
    pub fn resolve(&self, count: u64) -> Result<Vec<u64>> {
        let requested = self.include.iter().chain(self.exclude.iter());
        if let Some(&segment) = requested.filter(|&&n| n >= count).min() {
            return Err(Error::SegmentOutOfRange { segment, count });
        }
        if !self.include.is_empty() {
            return Ok(self.include.iter().copied().collect());
        }
        Ok((0..count).filter(|n| !self.exclude.contains(n)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_selects_everything() {
        let selection = SegmentSelection::new();
        assert!(selection.is_default());
        assert_eq!(selection.resolve(3).expect("resolve"), vec![0, 1, 2]);
        assert!(selection.resolve(0).expect("resolve").is_empty());
    }

    #[test]
    fn excludes_without_includes_remove_segments() {
        let mut selection = SegmentSelection::new();
        selection.exclude(1);
        selection.exclude(3);
        assert_eq!(selection.resolve(5).expect("resolve"), vec![0, 2, 4]);
    }

    #[test]
    fn includes_are_authoritative_and_sorted() {
        let mut selection = SegmentSelection::new();
        selection.include(4);
        selection.include(1);
        selection.exclude(2);
        assert_eq!(selection.resolve(5).expect("resolve"), vec![1, 4]);
    }

    #[test]
    fn include_wins_over_exclude_on_same_segment() {
        let mut selection = SegmentSelection::new();
        selection.exclude(2);
        selection.include(2);
        assert_eq!(selection.resolve(3).expect("resolve"), vec![2]);
    }

    #[test]
    fn out_of_range_request_is_reported() {
        let mut selection = SegmentSelection::new();
        selection.include(7);
        assert!(matches!(
            selection.resolve(3),
            Err(Error::SegmentOutOfRange { segment: 7, count: 3 })
        ));
        selection.include_all();
        assert_eq!(selection.resolve(3).expect("resolve"), vec![0, 1, 2]);
    }
}
