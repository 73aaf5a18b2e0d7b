//! L1 Qword contract (spec.md §4.1) and a reference in-memory implementation.
//!
//! The real posting-list reader (on-disk compression, dictionary lookup)
//! is external per spec.md §1; this module specifies the contract every
//! term leaf programs against and ships [`InMemoryQword`], a reference
//! cursor any embedder without a real on-disk reader yet can use, and
//! which this crate's own tests drive the operator tree with.

use crate::docid::DocId;
use crate::hitpos::{Hitpos, EMPTY_HIT};

/// One document returned by `next_doc`. `docid == 0` means end of stream
/// (spec.md §4.1); `0` is never a valid document id in this model, since
/// document ids are assigned starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QwordMatch {
    pub docid: DocId,
    pub fields_mask: u64,
    pub match_hits: u32,
    /// Encodes where the hitlist cursor should be positioned by
    /// `seek_hitlist`: if the high bit is set, the remaining bits carry one
    /// inlined hit (packed `Hitpos` plus field) rather than a file offset.
    /// This is deliberately the *only* place the "inlined" marker and
    /// `Hitpos`'s own `field_end` bit interact, keeping the two concerns
    /// from overlapping (see `hitpos.rs` module doc and
    /// `DESIGN.md`'s open-question decision #1).
    pub hitlist_position: u64,
}

impl QwordMatch {
    pub const END_OF_STREAM: QwordMatch =
        QwordMatch { docid: 0, fields_mask: 0, match_hits: 0, hitlist_position: 0 };

    pub fn is_end_of_stream(&self) -> bool {
        self.docid == 0
    }
}

const INLINE_BIT: u64 = 1 << 63;

/// A sparse index into a term's doclist, enabling O(log n) seeks.
#[derive(Debug, Clone, Copy)]
pub struct SkiplistEntry {
    pub base_docid: DocId,
    pub doclist_offset: u64,
    pub base_hitlist_offset: u64,
}

/// Per-keyword posting cursor: coupled doclist and hitlist streams plus a
/// skiplist for seeks.
pub trait Qword {
    /// Returns the next document, or `QwordMatch::END_OF_STREAM` at EOF.
    fn next_doc(&mut self) -> QwordMatch;

    /// Positions the hitlist cursor per the encoding in
    /// [`QwordMatch::hitlist_position`].
    fn seek_hitlist(&mut self, pos: u64);

    /// Returns the next hit within the current document, or `EMPTY_HIT` at
    /// document end.
    fn next_hit(&mut self) -> Hitpos;

    /// Skips over all skiplist blocks whose `base_docid + min_id < min`;
    /// never overshoots the block containing `min`.
    fn hint_docid(&mut self, min: DocId);

    /// Returns to the start of the stream.
    fn reset(&mut self);

    /// Total documents this keyword occurs in (for IDF).
    fn docs(&self) -> u64;

    /// Total hits this keyword occurs in (for IDF).
    fn hits(&self) -> u64;

    /// `true` if this keyword's hitlist is not available (hitless index);
    /// leaves fall back to synthesizing one hit per matched field.
    fn is_hitless(&self) -> bool;

    /// IDF, assigned by the coordinator after parsing (spec.md §4.1).
    fn idf(&self) -> f32;
    fn set_idf(&mut self, idf: f32);
}

struct PostedDoc {
    docid: DocId,
    fields_mask: u64,
    hits: Vec<Hitpos>,
}

/// Reference [`Qword`] implementation over an in-memory posting list,
/// sorted ascending by docid, with hits sorted ascending per spec.md §3.
pub struct InMemoryQword {
    docs: Vec<PostedDoc>,
    skiplist: Vec<SkiplistEntry>,
    cursor: usize,
    current_doc: Option<usize>,
    hit_cursor: usize,
    inline_hit: Option<Hitpos>,
    idf: f32,
    hitless: bool,
    skiplist_stride: usize,
}

impl InMemoryQword {
    /// `postings`: one `(docid, fields_mask, hits)` per matched document,
    /// already ordered ascending by docid with each hit list ordered
    /// ascending by `(field, position)`.
    pub fn new(postings: Vec<(DocId, u64, Vec<Hitpos>)>, hitless: bool) -> Self {
        let docs: Vec<PostedDoc> = postings
            .into_iter()
            .map(|(docid, fields_mask, hits)| PostedDoc { docid, fields_mask, hits })
            .collect();
        let skiplist_stride = 16;
        let skiplist = docs
            .iter()
            .enumerate()
            .step_by(skiplist_stride)
            .map(|(i, d)| SkiplistEntry {
                base_docid: d.docid,
                doclist_offset: i as u64,
                base_hitlist_offset: i as u64,
            })
            .collect();
        InMemoryQword {
            docs,
            skiplist,
            cursor: 0,
            current_doc: None,
            hit_cursor: 0,
            inline_hit: None,
            idf: 0.0,
            hitless,
            skiplist_stride,
        }
    }

    pub fn docs_count(&self) -> usize {
        self.docs.len()
    }
}

impl Qword for InMemoryQword {
    fn next_doc(&mut self) -> QwordMatch {
        if self.cursor >= self.docs.len() {
            return QwordMatch::END_OF_STREAM;
        }
        let doc = &self.docs[self.cursor];
        self.cursor += 1;
        let match_hits = doc.hits.len() as u32;
        let hitlist_position = if match_hits == 1 {
            INLINE_BIT | doc.hits[0].raw() as u64
        } else {
            // position encodes "index of this document's hits in our
            // private storage"; a real reader would encode a file offset.
            (self.cursor - 1) as u64
        };
        QwordMatch { docid: doc.docid, fields_mask: doc.fields_mask, match_hits, hitlist_position }
    }

    fn seek_hitlist(&mut self, pos: u64) {
        self.hit_cursor = 0;
        if pos & INLINE_BIT != 0 {
            self.inline_hit = Some(Hitpos::from_raw((pos & !INLINE_BIT) as u32));
            self.current_doc = None;
        } else {
            self.inline_hit = None;
            self.current_doc = Some(pos as usize);
        }
    }

    fn next_hit(&mut self) -> Hitpos {
        if let Some(hit) = self.inline_hit.take() {
            return hit;
        }
        let Some(idx) = self.current_doc else { return EMPTY_HIT };
        let hits = &self.docs[idx].hits;
        if self.hit_cursor >= hits.len() {
            return EMPTY_HIT;
        }
        let hit = hits[self.hit_cursor];
        self.hit_cursor += 1;
        hit
    }

    fn hint_docid(&mut self, min: DocId) {
        let mut block_start = 0usize;
        for entry in &self.skiplist {
            if entry.base_docid < min {
                block_start = entry.doclist_offset as usize;
            } else {
                break;
            }
        }
        // never overshoot the block containing `min`: scan forward linearly
        // from the chosen block without skipping past an exact match.
        let mut i = block_start.max(self.cursor);
        while i < self.docs.len() && self.docs[i].docid < min {
            i += 1;
        }
        self.cursor = i;
        let _ = self.skiplist_stride;
    }

    fn reset(&mut self) {
        self.cursor = 0;
        self.hit_cursor = 0;
        self.current_doc = None;
        self.inline_hit = None;
    }

    fn docs(&self) -> u64 {
        self.docs.len() as u64
    }

    fn hits(&self) -> u64 {
        self.docs.iter().map(|d| d.hits.len() as u64).sum()
    }

    fn is_hitless(&self) -> bool {
        self.hitless
    }

    fn idf(&self) -> f32 {
        self.idf
    }

    fn set_idf(&mut self, idf: f32) {
        self.idf = idf;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hp(field: u32, pos: u32) -> Hitpos {
        Hitpos::new(field, pos, false)
    }

    #[test]
    fn drains_docs_in_order_and_terminates() {
        let mut q = InMemoryQword::new(
            vec![(1, 0b1, vec![hp(0, 0)]), (3, 0b1, vec![hp(0, 1), hp(0, 5)])],
            false,
        );
        let m1 = q.next_doc();
        assert_eq!(m1.docid, 1);
        let m2 = q.next_doc();
        assert_eq!(m2.docid, 3);
        assert!(q.next_doc().is_end_of_stream());
    }

    #[test]
    fn inline_hit_path_for_single_hit_docs() {
        let mut q = InMemoryQword::new(vec![(7, 0b1, vec![hp(0, 4)])], false);
        let m = q.next_doc();
        assert_eq!(m.match_hits, 1);
        q.seek_hitlist(m.hitlist_position);
        assert_eq!(q.next_hit(), hp(0, 4));
        assert_eq!(q.next_hit(), EMPTY_HIT);
    }

    #[test]
    fn multi_hit_path_yields_all_hits_then_empty() {
        let mut q = InMemoryQword::new(vec![(7, 0b1, vec![hp(0, 1), hp(0, 2), hp(1, 0)])], false);
        let m = q.next_doc();
        assert_eq!(m.match_hits, 3);
        q.seek_hitlist(m.hitlist_position);
        assert_eq!(q.next_hit(), hp(0, 1));
        assert_eq!(q.next_hit(), hp(0, 2));
        assert_eq!(q.next_hit(), hp(1, 0));
        assert_eq!(q.next_hit(), EMPTY_HIT);
    }

    #[test]
    fn reset_round_trips_the_whole_stream() {
        let mut q = InMemoryQword::new(
            vec![(1, 0b1, vec![hp(0, 0)]), (2, 0b1, vec![hp(0, 0)])],
            false,
        );
        let mut first_pass = Vec::new();
        loop {
            let m = q.next_doc();
            if m.is_end_of_stream() {
                break;
            }
            first_pass.push(m.docid);
        }
        q.reset();
        let mut second_pass = Vec::new();
        loop {
            let m = q.next_doc();
            if m.is_end_of_stream() {
                break;
            }
            second_pass.push(m.docid);
        }
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn hint_docid_skips_without_overshoot() {
        let mut q = InMemoryQword::new(
            (0..40).map(|i| (i + 1, 0b1, vec![hp(0, 0)])).collect(),
            false,
        );
        q.hint_docid(25);
        let m = q.next_doc();
        assert_eq!(m.docid, 25);
    }
}
