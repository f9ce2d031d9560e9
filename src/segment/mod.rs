//! Segment indexes over block-compressed channels.
//!
//! A segment is a logical record: the bytes written between two calls to
//! `mark_segment_boundary`. Boundaries live in an uncompressed `.seg` file
//! next to the channel's block files and are used to read arbitrary record
//! subsets without decompressing the rest of the channel.

mod index;
mod reader;
mod selection;
mod writer;

pub use index::{SegmentIndex, SegmentIndexWriter, SEGMENT_OFFSET_LEN};
pub use reader::SegmentReader;
pub use selection::SegmentSelection;
pub use writer::{SegmentWriter, SegmentedSummary};
