//! Quorum (spec.md §4.2.5): matches documents where at least `T` of `W`
//! distinct keywords occur. The general min-cursor algorithm below already
//! behaves like AND when `T == W` and like OR when `T == 1`, so no special
//! construction-time rewrite is needed for correctness; it is noted here
//! only as the degenerate-case explanation spec.md calls out.

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::{hit_order_key, ExtHit};
use crate::extdoc::ExtDoc;
use crate::operators::{BoxNode, DocCursor, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

/// `T` as either an absolute count or a percentage of `W`, resolved once at
/// construction.
#[derive(Debug, Clone, Copy)]
pub enum QuorumThreshold {
    Absolute(u32),
    Percent(u32),
}

impl QuorumThreshold {
    fn resolve(self, w: u32) -> u32 {
        match self {
            QuorumThreshold::Absolute(t) => t.min(w).max(1),
            QuorumThreshold::Percent(pct) => {
                (((w as u64 * pct as u64) + 99) / 100).max(1) as u32
            }
        }
    }
}

pub struct QuorumNode {
    children: Vec<DocCursor>,
    threshold: u32,
    docs_buf: Vec<ExtDoc>,
    match_mask: Vec<Vec<bool>>,
    hits: HitsPager,
}

impl QuorumNode {
    pub fn new(children: Vec<BoxNode>, threshold: QuorumThreshold) -> Self {
        let w = children.len() as u32;
        let threshold = threshold.resolve(w);
        QuorumNode {
            children: children.into_iter().map(DocCursor::new).collect(),
            threshold,
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            match_mask: Vec::new(),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for QuorumNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.match_mask.clear();
        self.hits.reset();
        while self.docs_buf.len() < MAX_DOCS {
            let Some(min_id) = self
                .children
                .iter_mut()
                .filter_map(|c| c.current(setup).map(|d| d.docid))
                .min()
            else {
                break;
            };
            let mut mask = vec![false; self.children.len()];
            let mut merged = ExtDoc::new(min_id);
            let mut coverage = 0u32;
            for (i, cursor) in self.children.iter_mut().enumerate() {
                if let Some(d) = cursor.current(setup) {
                    if d.docid == min_id {
                        mask[i] = true;
                        coverage += 1;
                        merged.field_mask |= d.field_mask;
                        merged.tf_idf += d.tf_idf;
                        cursor.advance();
                    }
                }
            }
            if coverage >= self.threshold {
                if !setup.exec.budget.charge_docs(1) {
                    setup.warnings.warn("query budget exhausted inside QUORUM");
                    break;
                }
                self.docs_buf.push(merged);
                self.match_mask.push(mask);
            }
        }
        if self.docs_buf.is_empty() {
            return None;
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.hits.is_fresh() {
            for (doc, mask) in docs.iter().filter(|d| !d.is_sentinel()).zip(self.match_mask.iter()) {
                let mut group = Vec::new();
                for (i, &matched) in mask.iter().enumerate() {
                    if matched {
                        let mut h = self.children[i].hits_for_doc(doc.docid, setup);
                        for hit in h.iter_mut() {
                            hit.nodepos = i as u32;
                        }
                        group.extend(h.drain(..));
                    }
                }
                group.sort_by_key(|h| hit_order_key(h, false));
                self.hits.scratch.extend(group);
            }
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        for c in self.children.iter_mut() {
            c.reset(setup);
        }
        self.docs_buf.clear();
        self.match_mask.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        for c in self.children.iter_mut() {
            c.hint_docid(min);
        }
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        self.children.iter().map(|c| c.node_ref().get_qwords(registry)).max().unwrap_or(0)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        for c in self.children.iter_mut() {
            c.node_mut().set_qwords_idf(registry);
        }
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        for c in self.children.iter() {
            c.node_ref().get_terms(registry, out);
        }
    }

    fn got_hitless(&self) -> bool {
        self.children.iter().any(|c| c.node_ref().got_hitless())
    }

    fn debug_word_id(&self) -> u64 {
        self.children.iter().fold(0, |acc, c| acc ^ c.node_ref().debug_word_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionContext;
    use crate::hitpos::Hitpos;
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

    fn term(docs: Vec<(u32, u64, Vec<Hitpos>)>, qpos: u32) -> BoxNode {
        let qword = InMemoryQword::new(docs, false);
        Box::new(TermNode::new(qword, MatchScope::all_fields(), 0, qpos, "w"))
    }

    #[test]
    fn quorum_three_of_four_matches_the_worked_example() {
        // {x,y,z} in doc5, {x,y,w} in doc6, {x} in doc7
        let x = term(vec![(5, 1, vec![hp(0)]), (6, 1, vec![hp(0)]), (7, 1, vec![hp(0)])], 1);
        let y = term(vec![(5, 1, vec![hp(0)]), (6, 1, vec![hp(0)])], 2);
        let z = term(vec![(5, 1, vec![hp(0)])], 3);
        let w = term(vec![(6, 1, vec![hp(0)])], 4);
        let mut node = QuorumNode::new(vec![x, y, z, w], QuorumThreshold::Absolute(3));
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![5, 6]);
    }

    #[test]
    fn increasing_threshold_shrinks_the_result() {
        let x = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)])], 1);
        let y = term(vec![(1, 1, vec![hp(0)])], 2);
        let z = term(vec![(1, 1, vec![hp(0)])], 3);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut low = QuorumNode::new(
            vec![term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)])], 1), term(vec![(1, 1, vec![hp(0)])], 2), term(vec![(1, 1, vec![hp(0)])], 3)],
            QuorumThreshold::Absolute(1),
        );
        let mut high = QuorumNode::new(vec![x, y, z], QuorumThreshold::Absolute(3));
        let low_ids: Vec<_> = low
            .get_docs_chunk(&ns)
            .unwrap()
            .iter()
            .filter(|d| !d.is_sentinel())
            .map(|d| d.docid)
            .collect();
        let high_ids: Vec<_> = high
            .get_docs_chunk(&ns)
            .unwrap()
            .iter()
            .filter(|d| !d.is_sentinel())
            .map(|d| d.docid)
            .collect();
        assert!(high_ids.iter().all(|d| low_ids.contains(d)));
        assert!(low_ids.len() >= high_ids.len());
    }
}
