//! Proximity FSM (spec.md §4.2.4): a sliding window of size `qlen + N`
//! keeps the latest hitpos seen for every query position in the group; once
//! every position has been seen inside the window, a hit is emitted and the
//! slowest position is cleared so the window can slide forward.

use std::collections::HashMap;

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::nway::{build_and_spine, NWayChild};
use crate::operators::{BoxNode, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

/// Runs the proximity FSM over one document's hits for a field at a time,
/// returning folded hits. `max_distance` is the `N` in `"a b c"~N`.
fn proximity_fsm(hits: &[ExtHit], qpos_order: &[u32], max_distance: u32) -> Vec<ExtHit> {
    let qlen = qpos_order.len() as u32;
    if qlen == 0 {
        return Vec::new();
    }
    let window = qlen + max_distance;
    let idx_of: HashMap<u32, usize> =
        qpos_order.iter().enumerate().map(|(i, &q)| (q, i)).collect();

    // per field: latest seen position for each query slot
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
            if hi - lo < window {
                let mut sorted = vals.clone();
                sorted.sort_unstable();
                let equal_delta_pairs =
                    sorted.windows(2).filter(|w| w[1] == w[0] + 1).count() as u32;
                let weight = 1 + equal_delta_pairs;
                out.push(ExtHit {
                    docid: h.docid,
                    hitpos: Hitpos::new(field, lo, false),
                    querypos: qpos_order[0],
                    nodepos: 0,
                    spanlen: hi - lo + 1,
                    matchlen: hi - lo + 1,
                    weight,
                    qpos_mask: if qlen >= 64 { u64::MAX } else { (1u64 << qlen) - 1 },
                });
                // slide the window: drop the slowest (smallest) position
                let slowest_slot =
                    positions.iter().enumerate().min_by_key(|(_, p)| p.unwrap()).unwrap().0;
                positions[slowest_slot] = None;
            }
        }
    }
    out
}

/// `"a b c"~N`: like phrase but tolerant of up to `N` extra words of slop,
/// in any order within the window.
pub struct ProximityNode {
    spine: BoxNode,
    qpos_order: Vec<u32>,
    max_distance: u32,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl ProximityNode {
    pub fn new(children: Vec<NWayChild>, max_distance: u32) -> Self {
        let (spine, qpos_order) = build_and_spine(children);
        ProximityNode {
            spine,
            qpos_order,
            max_distance,
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            hits: HitsPager::new(),
        }
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
            let folded = proximity_fsm(&group, &self.qpos_order, self.max_distance);
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

impl ExtNode for ProximityNode {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionContext;
    use crate::operators::term::TermNode;
    use crate::qword::InMemoryQword;
    use crate::scope::MatchScope;
    use crate::warnings::WarningSink;

    fn hp(pos: u32) -> Hitpos {
        Hitpos::new(0, pos, false)
    }

    fn setup() -> (ExecutionContext, WarningSink) {
        (ExecutionContext::unbounded(), WarningSink::new())
    }

    fn child(docs: Vec<(u32, u64, Vec<Hitpos>)>, qpos: u32) -> NWayChild {
        let qword = InMemoryQword::new(docs, false);
        let node: BoxNode = Box::new(TermNode::new(qword, MatchScope::all_fields(), 0, qpos, "w"));
        NWayChild { query_pos: qpos, node }
    }

    #[test]
    fn proximity_zero_matches_only_contiguous_span() {
        let a = child(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(1)])], 1);
        let b = child(vec![(1, 1, vec![hp(2)]), (2, 1, vec![hp(5)])], 2);
        let mut node = ProximityNode::new(vec![a, b], 0);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap().to_vec();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![1]);
    }

    #[test]
    fn proximity_with_slop_widens_the_match_set() {
        let a = child(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(1)])], 1);
        let b = child(vec![(1, 1, vec![hp(2)]), (2, 1, vec![hp(5)])], 2);
        let mut node = ProximityNode::new(vec![a, b], 10);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap().to_vec();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn phrase_is_a_subset_of_proximity_zero_is_a_subset_of_proximity_k() {
        let mk = |k: u32| {
            let a = child(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(1)])], 1);
            let b = child(vec![(1, 1, vec![hp(2)]), (2, 1, vec![hp(9)])], 2);
            ProximityNode::new(vec![a, b], k)
        };
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut p0 = mk(0);
        let mut p5 = mk(5);
        let ids0: Vec<_> = p0
            .get_docs_chunk(&ns)
            .map(|c| c.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect::<Vec<_>>())
            .unwrap_or_default();
        let ids5: Vec<_> = p5
            .get_docs_chunk(&ns)
            .map(|c| c.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect::<Vec<_>>())
            .unwrap_or_default();
        assert!(ids0.iter().all(|d| ids5.contains(d)));
    }
}
