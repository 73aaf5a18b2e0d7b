//! DocId: a monotonically orderable integer identifying a document.

/// A document identifier. Monotonically orderable; streams of these must be
/// strictly ascending within a chunk (spec.md §3, §8 property 1).
pub type DocId = u32;

/// Distinguished value terminating every doc/hit stream.
pub const DOCID_MAX: DocId = DocId::MAX;
