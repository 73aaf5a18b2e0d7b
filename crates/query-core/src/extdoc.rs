//! ExtDoc: a document record inside a docs chunk (spec.md §3).

use crate::docid::{DocId, DOCID_MAX};

/// One document matched by a node, as returned in a docs chunk.
///
/// Producers emit bounded chunks (at most [`crate::constants::MAX_DOCS`])
/// terminated by a sentinel entry whose `docid == DOCID_MAX`; callers of
/// this crate's node API never see the sentinel directly (see
/// [`crate::operators::ExtNode::get_docs_chunk`]), it is only used
/// internally by node implementations that build chunks incrementally.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtDoc {
    pub docid: DocId,
    /// Row pointer into per-node docinfo storage, if the node carries
    /// inline attribute data; `None` when attributes are fetched
    /// separately by the ranker through the index contract.
    pub docinfo_row: Option<u32>,
    /// Offset of this document's hitlist within the owning Qword, or 0 for
    /// nodes that do not expose hit offsets (e.g. folded N-way results).
    pub hitlist_offset: u64,
    /// Bitmask of fields in which at least one keyword matched.
    pub field_mask: u64,
    /// Running sum of `tf * idf` contributions folded in by OR/MAYBE.
    pub tf_idf: f32,
}

impl ExtDoc {
    pub const SENTINEL: ExtDoc = ExtDoc {
        docid: DOCID_MAX,
        docinfo_row: None,
        hitlist_offset: 0,
        field_mask: 0,
        tf_idf: 0.0,
    };

    pub fn new(docid: DocId) -> Self {
        ExtDoc { docid, docinfo_row: None, hitlist_offset: 0, field_mask: 0, tf_idf: 0.0 }
    }

    pub fn is_sentinel(&self) -> bool {
        self.docid == DOCID_MAX
    }
}

/// Validate the universal chunk invariants of spec.md §8 property 1: a
/// non-empty slice whose ids (excluding the final sentinel) are strictly
/// ascending and end with exactly one `DOCID_MAX` sentinel, if included.
pub fn assert_valid_chunk(docs: &[ExtDoc]) {
    let mut prev: Option<DocId> = None;
    for (i, d) in docs.iter().enumerate() {
        if d.is_sentinel() {
            debug_assert_eq!(i, docs.len() - 1, "sentinel must be the last entry in a chunk");
            continue;
        }
        if let Some(p) = prev {
            debug_assert!(d.docid > p, "docids must be strictly ascending within a chunk");
        }
        prev = Some(d.docid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_is_recognized() {
        assert!(ExtDoc::SENTINEL.is_sentinel());
        assert!(!ExtDoc::new(0).is_sentinel());
    }

    #[test]
    fn valid_chunk_passes() {
        let chunk = vec![ExtDoc::new(1), ExtDoc::new(5), ExtDoc::new(9), ExtDoc::SENTINEL];
        assert_valid_chunk(&chunk);
    }

    #[test]
    #[should_panic]
    fn non_ascending_chunk_fails_debug_assert() {
        let chunk = vec![ExtDoc::new(5), ExtDoc::new(1)];
        assert_valid_chunk(&chunk);
    }
}
