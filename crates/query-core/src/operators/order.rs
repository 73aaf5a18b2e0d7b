//! ORDER / BEFORE (spec.md §4.2.6): a doc matches iff every child matches it
//! and, within some one field, each child has a hit position such that the
//! chosen positions form a strictly increasing sequence in child order.
//! The "longest tracker"/"most-recent tracker" pair from spec.md collapses
//! here into a greedy per-field chain search: since we only need *a*
//! strictly increasing assignment (not the longest one) to decide
//! acceptance, greedily picking each child's smallest hit position that
//! still exceeds the previous child's chosen position is sufficient and
//! always finds a chain if one exists.

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::{BoxNode, DocCursor, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

/// Finds, for one field's hits (already grouped per child), a chain of
/// strictly increasing positions across children in order. Returns the
/// chosen `(field, position)` per child if a chain exists.
fn find_chain(per_child_positions: &[Vec<u32>], field: u32) -> Option<Vec<ExtHit>> {
    let mut chosen = Vec::with_capacity(per_child_positions.len());
    let mut floor: Option<u32> = None;
    for positions in per_child_positions {
        let next = positions.iter().copied().filter(|&p| floor.map_or(true, |f| p > f)).min()?;
        floor = Some(next);
        chosen.push(next);
    }
    Some(
        chosen
            .into_iter()
            .enumerate()
            .map(|(i, pos)| ExtHit {
                docid: 0,
                hitpos: Hitpos::new(field, pos, false),
                querypos: i as u32 + 1,
                nodepos: i as u32,
                spanlen: 1,
                matchlen: 1,
                weight: 1,
                qpos_mask: 1u64 << i.min(63),
            })
            .collect(),
    )
}

pub struct OrderNode {
    children: Vec<DocCursor>,
    docs_buf: Vec<ExtDoc>,
    chains: Vec<Vec<ExtHit>>,
    hits: HitsPager,
}

impl OrderNode {
    pub fn new(children: Vec<BoxNode>) -> Self {
        OrderNode {
            children: children.into_iter().map(DocCursor::new).collect(),
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            chains: Vec::new(),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for OrderNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.chains.clear();
        self.hits.reset();
        'outer: while self.docs_buf.len() < MAX_DOCS {
            // N-ary intersection: repeatedly chase the max current docid
            // across children until every child sits on the same id, or
            // any child runs out (no more common docs are possible).
            let min_id = loop {
                let Some(mut target) = self
                    .children
                    .iter_mut()
                    .filter_map(|c| c.current(setup).map(|d| d.docid))
                    .max()
                else {
                    break 'outer;
                };
                let mut all_equal = true;
                for cursor in self.children.iter_mut() {
                    loop {
                        match cursor.current(setup) {
                            Some(d) if d.docid < target => cursor.advance(),
                            Some(d) if d.docid == target => break,
                            Some(d) => {
                                target = d.docid;
                                all_equal = false;
                                break;
                            }
                            None => break 'outer,
                        }
                    }
                }
                if all_equal {
                    break target;
                }
            };
            // collect per-child, per-field position lists for this doc
            let per_child: Vec<Vec<ExtHit>> =
                self.children.iter_mut().map(|c| c.hits_for_doc(min_id, setup)).collect();
            let mut fields = std::collections::BTreeSet::new();
            for hits in &per_child {
                for h in hits {
                    fields.insert(h.hitpos.field());
                }
            }
            let mut best_chain: Option<Vec<ExtHit>> = None;
            for field in fields {
                let per_child_positions: Vec<Vec<u32>> = per_child
                    .iter()
                    .map(|hits| {
                        hits.iter().filter(|h| h.hitpos.field() == field).map(|h| h.hitpos.position()).collect()
                    })
                    .collect();
                if let Some(chain) = find_chain(&per_child_positions, field) {
                    best_chain = Some(chain);
                    break;
                }
            }
            for cursor in self.children.iter_mut() {
                cursor.advance();
            }
            if let Some(mut chain) = best_chain {
                if !setup.exec.budget.charge_docs(1) {
                    setup.warnings.warn("query budget exhausted inside ORDER");
                    break;
                }
                for h in chain.iter_mut() {
                    h.docid = min_id;
                }
                self.docs_buf.push(ExtDoc::new(min_id));
                self.chains.push(chain);
            }
        }
        if self.docs_buf.is_empty() {
            return None;
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, _docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.hits.is_fresh() {
            for chain in self.chains.drain(..) {
                self.hits.scratch.extend(chain);
            }
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        for c in self.children.iter_mut() {
            c.reset(setup);
        }
        self.docs_buf.clear();
        self.chains.clear();
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
    fn order_requires_increasing_positions_in_one_field() {
        // doc 1: "a"@1 then "b"@2 -> ordered. doc 2: "a"@5, "b"@2 -> not ordered.
        let a = term(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(5)])], 1);
        let b = term(vec![(1, 1, vec![hp(2)]), (2, 1, vec![hp(2)])], 2);
        let mut node = OrderNode::new(vec![a, b]);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![1]);
    }
}
