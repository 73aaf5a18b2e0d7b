//! Conditional filter (spec.md §4.2.2): wraps a child with a hit predicate
//! — field-limit, field-start, field-end, field-start-end, or zone — and
//! keeps only docs with at least one surviving hit. The buffering needed
//! to preserve the streaming contract across chunk boundaries collapses to
//! materializing one child chunk's worth of filtered hits at a time, the
//! same `COPY_FILTERED`/`COPY_TRAILING`/`COPY_DONE` idea spec.md describes,
//! expressed here as "drained" vs. "not yet drained" rather than an
//! explicit three-state enum.

use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::{BoxNode, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

pub type HitPredicate = Box<dyn FnMut(DocId, Hitpos) -> bool>;

pub fn field_limit(max_pos: u32) -> HitPredicate {
    Box::new(move |_docid, hit| hit.position() <= max_pos)
}

pub fn field_start() -> HitPredicate {
    Box::new(|_docid, hit| hit.position() == 1)
}

pub fn field_end() -> HitPredicate {
    Box::new(|_docid, hit| hit.is_end())
}

pub fn field_start_end() -> HitPredicate {
    Box::new(|_docid, hit| hit.position() == 1 || hit.is_end())
}

pub struct FilterNode {
    child: BoxNode,
    predicate: HitPredicate,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl FilterNode {
    pub fn new(child: BoxNode, predicate: HitPredicate) -> Self {
        FilterNode { child, predicate, docs_buf: Vec::new(), hits: HitsPager::new() }
    }

    fn drain_one_child_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<bool> {
        let child_docs = self.child.get_docs_chunk(setup)?.to_vec();
        let mut all_hits = Vec::new();
        while let Some(chunk) = self.child.get_hits_chunk(&child_docs, setup) {
            all_hits.extend_from_slice(chunk);
        }
        let mut produced_any = false;
        for doc in child_docs.iter().filter(|d| !d.is_sentinel()) {
            let surviving: Vec<ExtHit> = all_hits
                .iter()
                .filter(|h| h.docid == doc.docid && (self.predicate)(h.docid, h.hitpos))
                .copied()
                .collect();
            if !surviving.is_empty() {
                setup.exec.budget.charge_docs(1);
                self.docs_buf.push(*doc);
                self.hits.scratch.extend(surviving);
                produced_any = true;
            }
        }
        Some(produced_any)
    }
}

impl ExtNode for FilterNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.hits.reset();
        loop {
            match self.drain_one_child_chunk(setup) {
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
        self.child.reset(setup);
        self.docs_buf.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.child.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        self.child.get_qwords(registry)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.child.set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.child.get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.child.got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.child.debug_word_id()
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

    #[test]
    fn field_start_keeps_only_docs_with_a_leading_hit() {
        let qword = InMemoryQword::new(vec![(1, 1, vec![hp(1)]), (2, 1, vec![hp(3)])], false);
        let term: BoxNode = Box::new(TermNode::new(qword, MatchScope::all_fields(), 0, 1, "w"));
        let mut node = FilterNode::new(term, field_start());
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs = node.get_docs_chunk(&ns).unwrap();
        let ids: Vec<_> = docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![1]);
    }
}
