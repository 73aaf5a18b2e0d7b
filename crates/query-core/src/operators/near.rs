//! Multinear FSM (spec.md §4.2.4, keyword-level NEAR/k): all expected query
//! positions must occur within a window of `near` positions of each other,
//! in any order. Unlike proximity, the window is fixed at `near` rather
//! than `qlen + near` since NEAR does not reward in-order runs specially;
//! this crate uses one ring-buffer implementation for both the two-argument
//! ("twofer") and multi-argument ("multiway") cases described in spec.md,
//! since the multiway algorithm already degrades correctly to two terms.

use std::collections::HashMap;

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::nway::{build_and_spine, NWayChild};
use crate::operators::{BoxNode, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

fn near_fsm(hits: &[ExtHit], qpos_order: &[u32], near: u32) -> Vec<ExtHit> {
    let qlen = qpos_order.len() as u32;
    if qlen == 0 {
        return Vec::new();
    }
    let idx_of: HashMap<u32, usize> =
        qpos_order.iter().enumerate().map(|(i, &q)| (q, i)).collect();
    let mut seen: HashMap<u32, Vec<Option<u32>>> = HashMap::new();
    let mut out = Vec::new();
    for h in hits {
        let Some(&slot) = idx_of.get(&h.querypos) else { continue };
        let field = h.hitpos.field();
        let positions = seen.entry(field).or_insert_with(|| vec![None; qlen as usize]);
        positions[slot] = Some(h.hitpos.position());
        if positions.iter().all(|p| p.is_some()) {
            let vals: Vec<u32> = positions.iter().map(|p| p.unwrap()).collect();
            let lo = *vals.iter().min().unwrap();
            let hi = *vals.iter().max().unwrap();
            if hi - lo <= near {
                out.push(ExtHit {
                    docid: h.docid,
                    hitpos: Hitpos::new(field, lo, false),
                    querypos: qpos_order[0],
                    nodepos: 0,
                    spanlen: hi - lo + 1,
                    matchlen: hi - lo + 1,
                    weight: qlen,
                    qpos_mask: if qlen >= 64 { u64::MAX } else { (1u64 << qlen) - 1 },
                });
                let slowest_slot =
                    positions.iter().enumerate().min_by_key(|(_, p)| p.unwrap()).unwrap().0;
                positions[slowest_slot] = None;
            }
        }
    }
    out
}

/// `NEAR/k`: every keyword must occur within `k` positions of every other,
/// regardless of order.
pub struct NearNode {
    spine: BoxNode,
    qpos_order: Vec<u32>,
    near: u32,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl NearNode {
    pub fn new(children: Vec<NWayChild>, near: u32) -> Self {
        let (spine, qpos_order) = build_and_spine(children);
        NearNode { spine, qpos_order, near, docs_buf: Vec::with_capacity(MAX_DOCS + 1), hits: HitsPager::new() }
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
            let folded = near_fsm(&group, &self.qpos_order, self.near);
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

impl ExtNode for NearNode {
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
