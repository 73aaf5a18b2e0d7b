//! Phrase FSM (spec.md §4.2.4): state indexed by atom position, advancing
//! on a hit whose doc position matches `start + Δ[qpos - first_qpos]`.
//! `Δ` tolerates stopword-induced gaps because it is taken straight from
//! the atoms' query positions rather than their 0-based index.

use std::collections::HashMap;

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::nway::{build_and_spine, NWayChild};
use crate::operators::{BoxNode, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

fn folded_hit(docid: DocId, field: u32, start: u32, first_qpos: u32, natoms: u32) -> ExtHit {
    ExtHit {
        docid,
        hitpos: Hitpos::new(field, start, false),
        querypos: first_qpos,
        nodepos: 0,
        spanlen: natoms,
        matchlen: natoms,
        weight: natoms,
        qpos_mask: if natoms >= 64 { u64::MAX } else { (1u64 << natoms) - 1 },
    }
}

/// Runs the phrase FSM over one document's hits (already sorted ascending
/// by `(hitpos, querypos)`), returning one folded hit per phrase
/// occurrence found.
fn phrase_fsm(hits: &[ExtHit], qpos_order: &[u32]) -> Vec<ExtHit> {
    let natoms = qpos_order.len() as u32;
    if qpos_order.is_empty() {
        return Vec::new();
    }
    let first_qpos = qpos_order[0];
    let pos_to_idx: HashMap<u32, usize> =
        qpos_order.iter().enumerate().map(|(i, &q)| (q, i)).collect();
    let deltas: Vec<u32> = qpos_order.iter().map(|&q| q.saturating_sub(first_qpos)).collect();

    let mut out = Vec::new();
    // one in-progress chain per field
    let mut state: HashMap<u32, (u32, usize)> = HashMap::new();
    for h in hits {
        let Some(&idx) = pos_to_idx.get(&h.querypos) else { continue };
        let field = h.hitpos.field();
        let pos = h.hitpos.position();
        if idx == 0 {
            if natoms == 1 {
                out.push(folded_hit(h.docid, field, pos, first_qpos, 1));
            } else {
                state.insert(field, (pos, 1));
            }
            continue;
        }
        if let Some(&(start, next_idx)) = state.get(&field) {
            if idx == next_idx && pos == start + deltas[idx] {
                if idx as u32 + 1 == natoms {
                    out.push(folded_hit(h.docid, field, start, first_qpos, natoms));
                    state.remove(&field);
                } else {
                    state.insert(field, (start, idx + 1));
                }
                continue;
            }
        }
        // a hit that does not extend any chain simply does not advance one;
        // it may still start a fresh chain later via idx == 0.
    }
    out
}

/// Exact phrase match: `[a b c]`. Built from an AND-spine over its
/// keyword children; accepts a document only if the FSM folds at least one
/// hit for it.
pub struct PhraseNode {
    spine: BoxNode,
    qpos_order: Vec<u32>,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl PhraseNode {
    pub fn new(children: Vec<NWayChild>) -> Self {
        let (spine, qpos_order) = build_and_spine(children);
        PhraseNode { spine, qpos_order, docs_buf: Vec::with_capacity(MAX_DOCS + 1), hits: HitsPager::new() }
    }

    fn drain_one_spine_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<bool> {
        let spine_docs = self.spine.get_docs_chunk(setup)?.to_vec();
        let mut all_hits = Vec::new();
        while let Some(chunk) = self.spine.get_hits_chunk(&spine_docs, setup) {
            all_hits.extend_from_slice(chunk);
        }
        let mut produced_any = false;
        let mut i = 0;
        for doc in spine_docs.iter().filter(|d| !d.is_sentinel()) {
            while i < all_hits.len() && all_hits[i].docid < doc.docid {
                i += 1;
            }
            let start = i;
            while i < all_hits.len() && all_hits[i].docid == doc.docid {
                i += 1;
            }
            let mut group: Vec<ExtHit> = all_hits[start..i].to_vec();
            group.sort_by_key(|h| (h.hitpos, h.querypos));
            let folded = phrase_fsm(&group, &self.qpos_order);
            if !folded.is_empty() {
                setup.exec.budget.charge_docs(1);
                self.docs_buf.push(*doc);
                self.hits.scratch.extend(folded);
                produced_any = true;
            }
        }
        Some(produced_any)
    }
}

impl ExtNode for PhraseNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.hits.reset();
        loop {
            match self.drain_one_spine_chunk(setup) {
                None => return None,
                Some(_) if !self.docs_buf.is_empty() => break,
                Some(_) => continue,
            }
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, _docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.spine.reset(setup);
        self.docs_buf.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.spine.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        self.spine.get_qwords(registry)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.spine.set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.spine.get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.spine.got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.spine.debug_word_id()
    }
}
