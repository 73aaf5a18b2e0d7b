//! Expression ranker factor pool and per-document mini-FSMs (spec.md
//! §4.5). `update(hit)` runs four detectors in parallel; `Factors::reset`
//! clears them at a document boundary.
//!
//! Grounded on `crates/milli/src/search/new/ranking_rule_graph/proximity`'s
//! per-field running state shape, generalized from a single "proximity
//! cost" accumulator to the four independent per-field byte-vector
//! factors spec.md names (LCS, LCCS/WLCCS, min-gaps, ATC).

use fxhash::FxHashMap;

use crate::docid::DocId;
use crate::exthit::ExtHit;

const MAX_FIELDS: usize = 32;
const ATC_RING: usize = 30;
const ATC_WINDOW: i32 = 10;

/// Per-field byte/float vectors plus per-document scalars (spec.md §4.5,
/// first bullet). Indexed by field id, capped at [`MAX_FIELDS`] — fields
/// beyond that share the last slot, matching the "wide field" degrade
/// already used by [`crate::scope::MatchScope::is_wide_fields`].
#[derive(Debug, Clone, Default)]
pub struct Factors {
    pub lcs: [u8; MAX_FIELDS],
    pub word_count: [u8; MAX_FIELDS],
    pub hit_count: [u8; MAX_FIELDS],
    pub min_hit_pos: [u32; MAX_FIELDS],
    pub min_best_span_pos: [u32; MAX_FIELDS],
    pub max_window_hits: [u8; MAX_FIELDS],
    pub min_gaps: [u32; MAX_FIELDS],
    pub lccs: [u8; MAX_FIELDS],
    pub wlccs: [f32; MAX_FIELDS],
    pub atc: [f32; MAX_FIELDS],

    pub min_idf: [f32; MAX_FIELDS],
    pub max_idf: [f32; MAX_FIELDS],
    pub sum_idf: [f32; MAX_FIELDS],
    pub tf_idf: [f32; MAX_FIELDS],
    pub field_tf: [f32; MAX_FIELDS],

    pub bm25: f32,
    pub bm25a: f32,
    pub exact_hit_mask: u64,
    pub exact_order_mask: u64,
    pub matched_fields_mask: u64,
    pub doc_word_count: u32,

    lcs_state: [LcsFsm; MAX_FIELDS],
    lccs_state: [LccsFsm; MAX_FIELDS],
    gap_state: [MinGapFsm; MAX_FIELDS],
    atc_state: [AtcFsm; MAX_FIELDS],
}

fn field_slot(field: u32) -> usize {
    (field as usize).min(MAX_FIELDS - 1)
}

impl Factors {
    pub fn reset(&mut self) {
        *self = Factors::default();
    }

    /// Runs all four mini-FSMs for one hit (spec.md §4.5, four numbered
    /// detectors). `idf` is this hit's keyword's precomputed IDF.
    pub fn update(&mut self, hit: &ExtHit, idf: f32) {
        let f = field_slot(hit.hitpos.field());
        self.matched_fields_mask |= 1u64 << (f as u64 % 64);
        self.hit_count[f] = self.hit_count[f].saturating_add(1);
        self.doc_word_count += 1;
        self.min_idf[f] = if self.hit_count[f] == 1 { idf } else { self.min_idf[f].min(idf) };
        self.max_idf[f] = self.max_idf[f].max(idf);
        self.sum_idf[f] += idf;
        self.field_tf[f] += 1.0;
        self.tf_idf[f] += idf;
        if self.min_hit_pos[f] == 0 || hit.hitpos.position() < self.min_hit_pos[f] {
            self.min_hit_pos[f] = hit.hitpos.position();
        }

        let pos = hit.hitpos.position() as i64;
        let qpos = hit.querypos as i64;

        let lcs = self.lcs_state[f].update(pos, qpos, hit.qpos_mask);
        // A pre-folded phrase/proximity hit already carries its contiguous
        // span length in `matchlen`; a single FSM call can't reconstruct
        // that by itself, so take whichever is larger.
        self.lcs[f] = self.lcs[f].max(lcs).max(hit.matchlen.min(u8::MAX as u32) as u8);
        if lcs as u32 == hit.matchlen.max(1) {
            self.exact_hit_mask |= 1u64 << (f as u64 % 64);
        }

        let lccs = self.lccs_state[f].update(pos, qpos);
        self.lccs[f] = self.lccs[f].max(lccs);
        self.wlccs[f] = self.wlccs[f].max(self.lccs_state[f].weighted_tail(idf));
        if self.lccs_state[f].in_order_run {
            self.exact_order_mask |= 1u64 << (f as u64 % 64);
        }

        self.gap_state[f].update(pos, qpos);
        self.min_gaps[f] = self.gap_state[f].best_gap();

        let contribution = self.atc_state[f].update(pos, qpos, idf);
        self.atc[f] += contribution;

        self.word_count[f] = self.word_count[f].saturating_add(1);
    }
}

/// LCS via chain detection on `pos - querypos` delta (spec.md §4.5.1),
/// with a qpos-bitmask tail so repeated keywords still pick the longest
/// true subsequence rather than just the longest run of equal deltas.
#[derive(Debug, Clone, Default)]
struct LcsFsm {
    last_delta: Option<i64>,
    run: u8,
    best: u8,
    seen_qpos: u64,
}

impl LcsFsm {
    fn update(&mut self, pos: i64, qpos: i64, qpos_mask: u64) -> u8 {
        let delta = pos - qpos;
        let duplicate = (self.seen_qpos & qpos_mask) != 0;
        self.seen_qpos |= qpos_mask;
        if !duplicate && self.last_delta == Some(delta) {
            self.run = self.run.saturating_add(1);
        } else if !duplicate {
            self.run = 1;
        }
        self.last_delta = Some(delta);
        self.best = self.best.max(self.run);
        self.best
    }
}

/// Longest common contiguous subsequence of query/doc positions (spec.md
/// §4.5.2): a run only continues when both the query position and the
/// document position advance by exactly one from the previous hit.
#[derive(Debug, Clone, Default)]
struct LccsFsm {
    last_pos: Option<i64>,
    last_qpos: Option<i64>,
    run: u8,
    run_idf_sum: f32,
    best: u8,
    in_order_run: bool,
}

impl LccsFsm {
    fn update(&mut self, pos: i64, qpos: i64) -> u8 {
        let contiguous = self.last_pos == Some(pos - 1) && self.last_qpos == Some(qpos - 1);
        if contiguous {
            self.run = self.run.saturating_add(1);
            self.in_order_run = true;
        } else {
            self.run = 1;
            self.in_order_run = false;
        }
        self.last_pos = Some(pos);
        self.last_qpos = Some(qpos);
        self.best = self.best.max(self.run);
        self.best
    }

    fn weighted_tail(&mut self, idf: f32) -> f32 {
        if self.run > 1 {
            self.run_idf_sum += idf;
        } else {
            self.run_idf_sum = idf;
        }
        self.run_idf_sum
    }
}

/// Smallest window containing every query word, maintained incrementally
/// (spec.md §4.5.3). Tracks the last position seen per query position;
/// the window is `max(seen) - min(seen)` once every query position has
/// been seen at least once.
#[derive(Debug, Clone, Default)]
struct MinGapFsm {
    last_pos_for_qpos: FxHashMap<i64, i64>,
    best: Option<u32>,
}

impl MinGapFsm {
    fn update(&mut self, pos: i64, qpos: i64) {
        self.last_pos_for_qpos.insert(qpos, pos);
        if self.last_pos_for_qpos.len() < 2 {
            return;
        }
        let min = *self.last_pos_for_qpos.values().min().unwrap();
        let max = *self.last_pos_for_qpos.values().max().unwrap();
        let window = (max - min) as u32;
        self.best = Some(self.best.map_or(window, |b| b.min(window)));
    }

    fn best_gap(&self) -> u32 {
        self.best.unwrap_or(0)
    }
}

/// Aggregate term closeness (spec.md §4.5.4): a ring buffer of the last
/// `ATC_RING` hits; contribution for a hit is `Σ idf/|Δ|^1.75` over other
/// hits within `±ATC_WINDOW` positions, halved when two hits share a
/// query position (duplicate keyword).
#[derive(Debug, Clone, Default)]
struct AtcFsm {
    ring: Vec<(i64, i64, f32)>,
}

impl AtcFsm {
    fn update(&mut self, pos: i64, qpos: i64, idf: f32) -> f32 {
        let mut contribution = 0.0f32;
        for &(other_pos, other_qpos, other_idf) in &self.ring {
            let delta = (pos - other_pos).abs();
            if delta == 0 || delta > ATC_WINDOW as i64 {
                continue;
            }
            let mut term = (idf + other_idf) / 2.0 / (delta as f32).powf(1.75);
            if other_qpos == qpos {
                term /= 2.0;
            }
            contribution += term;
        }
        self.ring.push((pos, qpos, idf));
        if self.ring.len() > ATC_RING {
            self.ring.remove(0);
        }
        contribution.ln_1p()
    }
}

/// Fixed-size reference-counted pool of packed [`Factors`], keyed by
/// docid (spec.md §4.5 "packs all factors into a *factor pool*"; §5
/// "Factor-pool entries are reference-counted"). Same arena-of-reusable-
/// slots shape used elsewhere for cached cursors, but keyed by docid
/// instead of by word.
pub struct FactorPool {
    capacity: usize,
    slots: Vec<Option<(DocId, Factors, u32)>>,
    by_docid: FxHashMap<DocId, usize>,
    free: Vec<usize>,
}

impl FactorPool {
    pub fn new(capacity: usize) -> Self {
        FactorPool { capacity, slots: Vec::new(), by_docid: FxHashMap::default(), free: Vec::new() }
    }

    /// Inserts (or replaces) the packed factors for `docid` and AddRefs
    /// the slot. Returns `false` if the pool is full of live (ref > 0)
    /// entries and none could be evicted — pushing when full must only
    /// ever evict already-released entries (spec.md §8 boundary case).
    pub fn push(&mut self, docid: DocId, factors: Factors) -> bool {
        if let Some(&idx) = self.by_docid.get(&docid) {
            if let Some(slot) = &mut self.slots[idx] {
                slot.1 = factors;
                slot.2 += 1;
            }
            return true;
        }
        let idx = if let Some(idx) = self.free.pop() {
            idx
        } else if self.slots.len() < self.capacity {
            self.slots.push(None);
            self.slots.len() - 1
        } else {
            match self.slots.iter().position(|s| matches!(s, Some((_, _, 0)))) {
                Some(idx) => idx,
                None => return false,
            }
        };
        if let Some((old_docid, _, _)) = self.slots[idx].take() {
            self.by_docid.remove(&old_docid);
        }
        self.slots[idx] = Some((docid, factors, 1));
        self.by_docid.insert(docid, idx);
        true
    }

    pub fn get(&self, docid: DocId) -> Option<&Factors> {
        self.by_docid.get(&docid).and_then(|&idx| self.slots[idx].as_ref()).map(|(_, f, _)| f)
    }

    /// Release one reference; at zero the slot is returned to the free
    /// list (still holding stale data until the next `push` overwrites
    /// it, matching the "reused by the next packed-factors emission"
    /// wording of spec.md §5).
    pub fn release(&mut self, docid: DocId) {
        if let Some(&idx) = self.by_docid.get(&docid) {
            if let Some(slot) = &mut self.slots[idx] {
                slot.2 = slot.2.saturating_sub(1);
                if slot.2 == 0 {
                    self.by_docid.remove(&docid);
                    self.free.push(idx);
                }
            }
        }
    }

    pub fn live_count(&self) -> usize {
        self.by_docid.len()
    }
}
