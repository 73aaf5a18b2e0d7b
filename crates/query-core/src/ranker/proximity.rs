//! Positional ranker variants of spec.md §4.4: `proximity (+bm25)`,
//! `proximity-payload`, `match-any`, `sph04`. All four reuse the LCS mini-
//! FSM of [`crate::ranker::factors`] rather than re-deriving chain
//! detection, since LCS-by-delta is the shared core of "how close do the
//! query words sit in this field".

use crate::constants::SPH_BM25_SCALE;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::ranker::factors::Factors;
use crate::ranker::{FieldLens, Match, RankerState};

/// Per-field running LCS, folded against field weights at finalize time;
/// optionally adds a BM25 contribution carried on `hit.weight`.
pub struct ProximityState {
    factors: Factors,
    tf_idf: f32,
    field_weight: Vec<f32>,
    with_bm25: bool,
}

impl ProximityState {
    pub fn new(field_weight: Vec<f32>, with_bm25: bool) -> Self {
        ProximityState { factors: Factors::default(), tf_idf: 0.0, field_weight, with_bm25 }
    }

    fn weighted_lcs_sum(&self) -> f32 {
        self.factors
            .lcs
            .iter()
            .enumerate()
            .map(|(field, &lcs)| lcs as f32 * self.field_weight.get(field).copied().unwrap_or(1.0))
            .sum()
    }
}

impl RankerState for ProximityState {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
        self.tf_idf = 0.0;
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.factors.update(hit, 1.0);
        self.tf_idf += hit.weight as f32;
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let base = self.weighted_lcs_sum() as i64;
        if self.with_bm25 {
            base + (self.tf_idf * SPH_BM25_SCALE as f32) as i64
        } else {
            base
        }
    }
}

/// As proximity, but fields flagged as payload contribute `position ×
/// weight` instead of LCS (spec.md §4.4 "proximity-payload").
pub struct ProximityPayloadState {
    factors: Factors,
    payload_fields: u64,
    field_weight: Vec<f32>,
    payload_sum: f32,
}

impl ProximityPayloadState {
    pub fn new(field_weight: Vec<f32>, payload_fields: u64) -> Self {
        ProximityPayloadState { factors: Factors::default(), payload_fields, field_weight, payload_sum: 0.0 }
    }
}

impl RankerState for ProximityPayloadState {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
        self.payload_sum = 0.0;
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        let field = hit.hitpos.field();
        if self.payload_fields & (1u64 << field.min(63)) != 0 {
            let weight = self.field_weight.get(field as usize).copied().unwrap_or(1.0);
            self.payload_sum += hit.hitpos.position() as f32 * weight;
        } else {
            self.factors.update(hit, 1.0);
        }
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let lcs_sum: f32 = self
            .factors
            .lcs
            .iter()
            .enumerate()
            .map(|(field, &lcs)| lcs as f32 * self.field_weight.get(field).copied().unwrap_or(1.0))
            .sum();
        (lcs_sum + self.payload_sum) as i64
    }
}

/// LCS plus a bit count of distinct matched query positions per field
/// (spec.md §4.4 "match-any").
pub struct MatchAnyState {
    factors: Factors,
    field_weight: Vec<f32>,
}

impl MatchAnyState {
    pub fn new(field_weight: Vec<f32>) -> Self {
        MatchAnyState { factors: Factors::default(), field_weight }
    }
}

impl RankerState for MatchAnyState {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.factors.update(hit, 1.0);
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let mut total = 0.0f32;
        for field in 0..self.factors.lcs.len() {
            let weight = self.field_weight.get(field).copied().unwrap_or(1.0);
            let distinct_qpos = self.factors.matched_fields_mask.count_ones() as f32;
            total += (self.factors.lcs[field] as f32 + distinct_qpos) * weight;
        }
        total as i64
    }
}

/// Proximity plus head-of-field bonus (hit at position 0 of a field) and
/// exact-hit bonus (spec.md §4.4 "sph04").
pub struct Sph04State {
    factors: Factors,
    field_weight: Vec<f32>,
    head_bonus: i64,
    exact_bonus: i64,
}

impl Sph04State {
    pub fn new(field_weight: Vec<f32>, head_bonus: i64, exact_bonus: i64) -> Self {
        Sph04State { factors: Factors::default(), field_weight, head_bonus, exact_bonus }
    }
}

impl RankerState for Sph04State {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.factors.update(hit, 1.0);
    }

    fn finalize(&mut self, _match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let lcs_sum: f32 = self
            .factors
            .lcs
            .iter()
            .enumerate()
            .map(|(field, &lcs)| lcs as f32 * self.field_weight.get(field).copied().unwrap_or(1.0))
            .sum();
        let mut bonus = 0i64;
        for field in 0..self.factors.min_hit_pos.len() {
            if self.factors.hit_count[field] > 0 && self.factors.min_hit_pos[field] == 0 {
                bonus += self.head_bonus;
            }
        }
        bonus += (self.factors.exact_hit_mask.count_ones() as i64) * self.exact_bonus;
        lcs_sum as i64 + bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitpos::Hitpos;

    fn hit(field: u32, pos: u32, qpos: u32) -> ExtHit {
        ExtHit::single(1, Hitpos::new(field, pos, false), qpos)
    }

    #[test]
    fn proximity_weighs_lcs_by_field() {
        let mut s = ProximityState::new(vec![2.0], false);
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(0, 1, 1), &[]);
        s.update(&hit(0, 2, 2), &[]);
        assert_eq!(s.finalize(&mut m, lens), 4);
    }

    #[test]
    fn payload_field_contributes_position_times_weight() {
        let mut s = ProximityPayloadState::new(vec![1.0], 0b1);
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(0, 7, 1), &[]);
        assert_eq!(s.finalize(&mut m, lens), 7);
    }

    #[test]
    fn sph04_rewards_head_of_field_hits() {
        let mut s = Sph04State::new(vec![1.0], 100, 0);
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&hit(0, 0, 1), &[]);
        assert_eq!(s.finalize(&mut m, lens), 100 + 1);
    }
}
