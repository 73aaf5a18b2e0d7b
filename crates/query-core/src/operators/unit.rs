//! UNIT / SENTENCE-PARAGRAPH (spec.md §4.2.7): binary. Emits a doc if an A
//! hit and a B hit co-occur inside the same textual unit, where a unit's
//! boundary is found via a sentinel separator term's hit positions (the
//! `.` or paragraph marker).

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::{BoxNode, DocCursor, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

/// Finds the smallest separator position strictly greater than `pos` in
/// the same field, or `u32::MAX` if the unit runs to the end of the field.
fn unit_end_after(separators: &[u32], pos: u32) -> u32 {
    separators.iter().copied().filter(|&s| s >= pos).min().unwrap_or(u32::MAX)
}

/// Does an A-hit/B-hit pair co-occur in the same unit: both at or before
/// the same next separator, with no separator strictly between them.
fn find_unit_pair(a_hits: &[u32], b_hits: &[u32], separators: &[u32]) -> Option<(u32, u32)> {
    for &a in a_hits {
        let unit_end = unit_end_after(separators, a);
        for &b in b_hits {
            if b == a {
                continue;
            }
            let (lo, hi) = if a < b { (a, b) } else { (b, a) };
            if hi <= unit_end {
                return Some((a, b));
            }
            let _ = lo;
        }
    }
    None
}

pub struct UnitNode {
    a: DocCursor,
    b: DocCursor,
    separator: DocCursor,
    docs_buf: Vec<ExtDoc>,
    pairs: Vec<(u32, u32, u32)>, // (field, a_pos, b_pos)
    hits: HitsPager,
}

impl UnitNode {
    pub fn new(a: BoxNode, b: BoxNode, separator: BoxNode) -> Self {
        UnitNode {
            a: DocCursor::new(a),
            b: DocCursor::new(b),
            separator: DocCursor::new(separator),
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            pairs: Vec::new(),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for UnitNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.pairs.clear();
        self.hits.reset();
        'outer: while self.docs_buf.len() < MAX_DOCS {
            let Some(mut target) = [&mut self.a, &mut self.b]
                .into_iter()
                .filter_map(|c| c.current(setup).map(|d| d.docid))
                .max()
            else {
                break;
            };
            loop {
                let mut all_equal = true;
                for cursor in [&mut self.a, &mut self.b] {
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
                    break;
                }
            }
            let docid = target;
            let a_hits = self.a.hits_for_doc(docid, setup);
            let b_hits = self.b.hits_for_doc(docid, setup);
            self.separator.hint_docid(docid);
            let sep_hits = self.separator.hits_for_doc(docid, setup);

            let mut matched_field = None;
            let mut fields = std::collections::BTreeSet::new();
            for h in a_hits.iter().chain(b_hits.iter()) {
                fields.insert(h.hitpos.field());
            }
            for field in fields {
                let a_pos: Vec<u32> =
                    a_hits.iter().filter(|h| h.hitpos.field() == field).map(|h| h.hitpos.position()).collect();
                let b_pos: Vec<u32> =
                    b_hits.iter().filter(|h| h.hitpos.field() == field).map(|h| h.hitpos.position()).collect();
                let sep_pos: Vec<u32> =
                    sep_hits.iter().filter(|h| h.hitpos.field() == field).map(|h| h.hitpos.position()).collect();
                if let Some((ap, bp)) = find_unit_pair(&a_pos, &b_pos, &sep_pos) {
                    matched_field = Some((field, ap, bp));
                    break;
                }
            }
            self.a.advance();
            self.b.advance();
            if let Some((field, ap, bp)) = matched_field {
                if !setup.exec.budget.charge_docs(1) {
                    setup.warnings.warn("query budget exhausted inside UNIT");
                    break;
                }
                self.docs_buf.push(ExtDoc::new(docid));
                self.pairs.push((field, ap, bp));
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
            for (doc, &(field, ap, bp)) in docs.iter().filter(|d| !d.is_sentinel()).zip(self.pairs.iter()) {
                let (lo, hi) = if ap < bp { (ap, bp) } else { (bp, ap) };
                self.hits.scratch.push(ExtHit {
                    docid: doc.docid,
                    hitpos: Hitpos::new(field, lo, false),
                    querypos: 1,
                    nodepos: 0,
                    spanlen: hi - lo + 1,
                    matchlen: hi - lo + 1,
                    weight: 2,
                    qpos_mask: 0b11,
                });
            }
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.a.reset(setup);
        self.b.reset(setup);
        self.separator.reset(setup);
        self.docs_buf.clear();
        self.pairs.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.a.hint_docid(min);
        self.b.hint_docid(min);
        self.separator.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        self.a.node_ref().get_qwords(registry).max(self.b.node_ref().get_qwords(registry))
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.a.node_mut().set_qwords_idf(registry);
        self.b.node_mut().set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.a.node_ref().get_terms(registry, out);
        self.b.node_ref().get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.a.node_ref().got_hitless() || self.b.node_ref().got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.a.node_ref().debug_word_id() ^ self.b.node_ref().debug_word_id()
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
    fn unit_requires_a_shared_sentence_with_no_dot_between() {
        // doc 1: a@1 dot@3 b@5 -> different sentences, no match.
        // doc 2: a@1 b@2 dot@5 -> same sentence, matches.
        let a = term(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(1)])], 1);
        let b = term(vec![(1, 1, vec![hp(5)]), (2, 1, vec![hp(2)])], 2);
        let dot = term(vec![(1, 1, vec![hp(3)]), (2, 1, vec![hp(5)])], 3);
        let mut node = UnitNode::new(a, b, dot);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![2]);
    }
}
