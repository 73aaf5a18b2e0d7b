//! The simple ranker variants of spec.md §4.4: `none`, `weight-sum`,
//! `bm25`, `wordcount`, `fieldmask`. None of these need the factor pool;
//! each keeps just enough per-document accumulator to finalize a weight.

use crate::constants::SPH_BM25_SCALE;
use crate::exthit::ExtHit;
use crate::ranker::{FieldLens, Match, RankerState};

/// `weight = 1` unconditionally.
pub struct NoneState;

impl RankerState for NoneState {
    fn start_doc(&mut self, _docid: crate::docid::DocId) {}
    fn update(&mut self, _hit: &ExtHit, _field_weight: &[f32]) {}
    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        1
    }
}

/// Σ field-weight × 1(field matched), optionally plus a BM25 contribution
/// carried in on `ExtDoc::tf_idf` by OR/MAYBE (spec.md §4.2.3).
pub struct WeightSumState {
    matched_fields: u64,
    tf_idf: f32,
    with_bm25: bool,
}

impl WeightSumState {
    pub fn new(with_bm25: bool) -> Self {
        WeightSumState { matched_fields: 0, tf_idf: 0.0, with_bm25 }
    }
}

impl RankerState for WeightSumState {
    fn start_doc(&mut self, _docid: crate::docid::DocId) {
        self.matched_fields = 0;
        self.tf_idf = 0.0;
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.matched_fields |= 1u64 << hit.hitpos.field().min(63);
        self.tf_idf += hit.weight as f32;
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let base = (self.matched_fields.count_ones() as i64) * SPH_BM25_SCALE / 10;
        if self.with_bm25 {
            base + (self.tf_idf * SPH_BM25_SCALE as f32) as i64
        } else {
            base
        }
    }
}

/// BM25 only: `doc.tf_idf` (accumulated per-hit weight already carrying
/// IDF) rescaled by `SPH_BM25_SCALE`.
pub struct Bm25State {
    tf_idf: f32,
}

impl Bm25State {
    pub fn new() -> Self {
        Bm25State { tf_idf: 0.0 }
    }
}

impl Default for Bm25State {
    fn default() -> Self {
        Self::new()
    }
}

impl RankerState for Bm25State {
    fn start_doc(&mut self, _docid: crate::docid::DocId) {
        self.tf_idf = 0.0;
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.tf_idf += hit.weight as f32;
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        (self.tf_idf * SPH_BM25_SCALE as f32) as i64
    }
}

/// Σ field-weight per hit (no dedup by field, unlike weight-sum).
pub struct WordcountState {
    sum: f32,
}

impl WordcountState {
    pub fn new() -> Self {
        WordcountState { sum: 0.0 }
    }
}

impl Default for WordcountState {
    fn default() -> Self {
        Self::new()
    }
}

impl RankerState for WordcountState {
    fn start_doc(&mut self, _docid: crate::docid::DocId) {
        self.sum = 0.0;
    }

    fn update(&mut self, hit: &ExtHit, field_weight: &[f32]) {
        self.sum += field_weight.get(hit.hitpos.field() as usize).copied().unwrap_or(1.0);
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        self.sum as i64
    }
}

/// Bitmask of matched fields, both as the weight and as `match_.field_mask`.
pub struct FieldmaskState {
    mask: u64,
}

impl FieldmaskState {
    pub fn new() -> Self {
        FieldmaskState { mask: 0 }
    }
}

impl Default for FieldmaskState {
    fn default() -> Self {
        Self::new()
    }
}

impl RankerState for FieldmaskState {
    fn start_doc(&mut self, _docid: crate::docid::DocId) {
        self.mask = 0;
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.mask |= 1u64 << hit.hitpos.field().min(63);
    }

    fn finalize(&mut self, match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        match_.field_mask = self.mask;
        self.mask as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docid::DocId;
    use crate::hitpos::Hitpos;

    fn hit(field: u32, pos: u32, weight: u32) -> ExtHit {
        ExtHit { weight, ..ExtHit::single(1 as DocId, Hitpos::new(field, pos, false), 1) }
    }

    #[test]
    fn none_state_always_weighs_one() {
        let mut s = NoneState;
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(0, 0, 1), &[]);
        assert_eq!(s.finalize(&mut m, lens), 1);
    }

    #[test]
    fn fieldmask_state_records_matched_fields_on_the_match() {
        let mut s = FieldmaskState::new();
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(2, 0, 1), &[]);
        s.update(&hit(5, 0, 1), &[]);
        let weight = s.finalize(&mut m, lens);
        assert_eq!(weight, (1 << 2) | (1 << 5));
        assert_eq!(m.field_mask, (1 << 2) | (1 << 5));
    }

    #[test]
    fn wordcount_sums_field_weights() {
        let mut s = WordcountState::new();
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(0, 0, 1), &[3.0]);
        s.update(&hit(0, 1, 1), &[3.0]);
        assert_eq!(s.finalize(&mut m, lens), 6);
    }
}
