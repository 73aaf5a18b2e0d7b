//! Two-argument boolean combinators (spec.md §4.2.3): AND, OR, AND-NOT,
//! MAYBE, and the zone-restricted AND variant.
//!
//! Each combinator drives two [`DocCursor`]s with a classic two-pointer
//! merge on docid, then on the next `get_hits_chunk` call interleaves the
//! children's hits for the emitted docs in `(hitpos, querypos)` order,
//! remapping `nodepos` to `0` (left) / `1` (right) so the ranker can tell
//! which branch a hit came from.

use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::{hit_order_key, ExtHit};
use crate::extdoc::ExtDoc;
use crate::operators::{BoxNode, DocCursor, ExtNode, HitsPager, NodeSetup};
use crate::registry::QwordRegistry;

fn merge_hits(mut left: Vec<ExtHit>, mut right: Vec<ExtHit>, reverse_qpos: bool) -> Vec<ExtHit> {
    for h in left.iter_mut() {
        h.nodepos = 0;
    }
    for h in right.iter_mut() {
        h.nodepos = 1;
    }
    left.extend(right);
    left.sort_by_key(|h| hit_order_key(h, reverse_qpos));
    left
}

/// Intersection. Two-pointer merge of docid streams; field masks OR'd and
/// `tf_idf` summed for matched docs.
pub struct AndNode {
    left: DocCursor,
    right: DocCursor,
    reverse_qpos: bool,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl AndNode {
    pub fn new(left: BoxNode, right: BoxNode) -> Self {
        AndNode {
            left: DocCursor::new(left),
            right: DocCursor::new(right),
            reverse_qpos: false,
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            hits: HitsPager::new(),
        }
    }

    /// Built under a phrase/proximity spine (spec.md §4.2.4) so the N-way
    /// FSM sees hits in query order rather than left/right order.
    pub fn new_qpos_reverse(left: BoxNode, right: BoxNode) -> Self {
        AndNode { reverse_qpos: true, ..AndNode::new(left, right) }
    }
}

impl ExtNode for AndNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.hits.reset();
        loop {
            if self.docs_buf.len() >= MAX_DOCS {
                break;
            }
            let (Some(l), Some(r)) = (self.left.current(setup), self.right.current(setup)) else {
                break;
            };
            if l.docid < r.docid {
                self.left.advance();
            } else if r.docid < l.docid {
                self.right.advance();
            } else {
                if !setup.exec.budget.charge_docs(1) {
                    setup.warnings.warn("query budget exhausted inside AND");
                    break;
                }
                let mut merged = ExtDoc::new(l.docid);
                merged.field_mask = l.field_mask | r.field_mask;
                merged.tf_idf = l.tf_idf + r.tf_idf;
                self.docs_buf.push(merged);
                self.left.advance();
                self.right.advance();
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
            for doc in docs.iter().filter(|d| !d.is_sentinel()) {
                let lh = self.left.hits_for_doc(doc.docid, setup);
                let rh = self.right.hits_for_doc(doc.docid, setup);
                self.hits.scratch.extend(merge_hits(lh, rh, self.reverse_qpos));
            }
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.left.reset(setup);
        self.right.reset(setup);
        self.docs_buf.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.left.hint_docid(min);
        self.right.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        let a = self.left.node_ref().get_qwords(registry);
        let b = self.right.node_ref().get_qwords(registry);
        a.max(b)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.left.node_mut().set_qwords_idf(registry);
        self.right.node_mut().set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.left.node_ref().get_terms(registry, out);
        self.right.node_ref().get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.left.node_ref().got_hitless() || self.right.node_ref().got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.left.node_ref().debug_word_id() ^ self.right.node_ref().debug_word_id()
    }
}

/// Union. Docid-ordered merge; matched docs OR their field masks and sum
/// `tf_idf`, unmatched docs pass through from whichever side has them.
pub struct OrNode {
    left: DocCursor,
    right: DocCursor,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl OrNode {
    pub fn new(left: BoxNode, right: BoxNode) -> Self {
        OrNode {
            left: DocCursor::new(left),
            right: DocCursor::new(right),
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for OrNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.hits.reset();
        while self.docs_buf.len() < MAX_DOCS {
            let l = self.left.current(setup);
            let r = self.right.current(setup);
            let merged = match (l, r) {
                (None, None) => break,
                (Some(l), None) => {
                    self.left.advance();
                    l
                }
                (None, Some(r)) => {
                    self.right.advance();
                    r
                }
                (Some(l), Some(r)) if l.docid < r.docid => {
                    self.left.advance();
                    l
                }
                (Some(l), Some(r)) if r.docid < l.docid => {
                    self.right.advance();
                    r
                }
                (Some(l), Some(r)) => {
                    self.left.advance();
                    self.right.advance();
                    let mut m = ExtDoc::new(l.docid);
                    m.field_mask = l.field_mask | r.field_mask;
                    m.tf_idf = l.tf_idf + r.tf_idf;
                    m
                }
            };
            if !setup.exec.budget.charge_docs(1) {
                setup.warnings.warn("query budget exhausted inside OR");
                break;
            }
            self.docs_buf.push(merged);
        }
        if self.docs_buf.is_empty() {
            return None;
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.hits.is_fresh() {
            for doc in docs.iter().filter(|d| !d.is_sentinel()) {
                let lh = self.left.hits_for_doc(doc.docid, setup);
                let rh = self.right.hits_for_doc(doc.docid, setup);
                self.hits.scratch.extend(merge_hits(lh, rh, false));
            }
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.left.reset(setup);
        self.right.reset(setup);
        self.docs_buf.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.left.hint_docid(min);
        self.right.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        let a = self.left.node_ref().get_qwords(registry);
        let b = self.right.node_ref().get_qwords(registry);
        a.max(b)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.left.node_mut().set_qwords_idf(registry);
        self.right.node_mut().set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.left.node_ref().get_terms(registry, out);
        self.right.node_ref().get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.left.node_ref().got_hitless() || self.right.node_ref().got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.left.node_ref().debug_word_id() ^ self.right.node_ref().debug_word_id()
    }
}

/// Set difference `{left} \ {right}`. Once `right` is exhausted, forwards
/// `left` unchanged (passthrough mode); hits come only from `left`.
pub struct AndNotNode {
    left: DocCursor,
    right: DocCursor,
    right_exhausted: bool,
    docs_buf: Vec<ExtDoc>,
    hits: HitsPager,
}

impl AndNotNode {
    pub fn new(left: BoxNode, right: BoxNode) -> Self {
        AndNotNode {
            left: DocCursor::new(left),
            right: DocCursor::new(right),
            right_exhausted: false,
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for AndNotNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.hits.reset();
        while self.docs_buf.len() < MAX_DOCS {
            let Some(l) = self.left.current(setup) else { break };
            if self.right_exhausted {
                if !setup.exec.budget.charge_docs(1) {
                    setup.warnings.warn("query budget exhausted inside AND-NOT passthrough");
                    break;
                }
                self.left.advance();
                self.docs_buf.push(l);
                continue;
            }
            match self.right.current(setup) {
                None => {
                    self.right_exhausted = true;
                }
                Some(r) if r.docid < l.docid => {
                    self.right.advance();
                }
                Some(r) if r.docid == l.docid => {
                    self.left.advance();
                    self.right.advance();
                }
                Some(_) => {
                    if !setup.exec.budget.charge_docs(1) {
                        setup.warnings.warn("query budget exhausted inside AND-NOT");
                        break;
                    }
                    self.left.advance();
                    self.docs_buf.push(l);
                }
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
            for doc in docs.iter().filter(|d| !d.is_sentinel()) {
                self.hits.scratch.extend(self.left.hits_for_doc(doc.docid, setup));
            }
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.left.reset(setup);
        self.right.reset(setup);
        self.right_exhausted = false;
        self.docs_buf.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.left.hint_docid(min);
        self.right.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        let a = self.left.node_ref().get_qwords(registry);
        let _ = self.right.node_ref().get_qwords(registry);
        a
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.left.node_mut().set_qwords_idf(registry);
        self.right.node_mut().set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.left.node_ref().get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.left.node_ref().got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.left.node_ref().debug_word_id()
    }
}

/// Left-join. Emits every doc from `left`; attributes merge with `right`
/// when the same docid appears there, otherwise `left` is emitted alone.
pub struct MaybeNode {
    left: DocCursor,
    right: DocCursor,
    docs_buf: Vec<ExtDoc>,
    matched_right: Vec<bool>,
    hits: HitsPager,
}

impl MaybeNode {
    pub fn new(left: BoxNode, right: BoxNode) -> Self {
        MaybeNode {
            left: DocCursor::new(left),
            right: DocCursor::new(right),
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            matched_right: Vec::with_capacity(MAX_DOCS),
            hits: HitsPager::new(),
        }
    }
}

impl ExtNode for MaybeNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.matched_right.clear();
        self.hits.reset();
        while self.docs_buf.len() < MAX_DOCS {
            let Some(l) = self.left.current(setup) else { break };
            while let Some(r) = self.right.current(setup) {
                if r.docid < l.docid {
                    self.right.advance();
                } else {
                    break;
                }
            }
            if !setup.exec.budget.charge_docs(1) {
                setup.warnings.warn("query budget exhausted inside MAYBE");
                break;
            }
            let mut merged = l;
            let mut matched = false;
            if let Some(r) = self.right.current(setup) {
                if r.docid == l.docid {
                    merged.field_mask |= r.field_mask;
                    merged.tf_idf += r.tf_idf;
                    matched = true;
                    self.right.advance();
                }
            }
            self.left.advance();
            self.docs_buf.push(merged);
            self.matched_right.push(matched);
        }
        if self.docs_buf.is_empty() {
            return None;
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.hits.is_fresh() {
            for (doc, &matched) in docs.iter().filter(|d| !d.is_sentinel()).zip(self.matched_right.iter()) {
                let lh = self.left.hits_for_doc(doc.docid, setup);
                if matched {
                    let rh = self.right.hits_for_doc(doc.docid, setup);
                    self.hits.scratch.extend(merge_hits(lh, rh, false));
                } else {
                    self.hits.scratch.extend(lh);
                }
            }
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits.page(crate::constants::MAX_HITS, setup.exec)
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.left.reset(setup);
        self.right.reset(setup);
        self.docs_buf.clear();
        self.matched_right.clear();
        self.hits.reset();
    }

    fn hint_docid(&mut self, min: DocId) {
        self.left.hint_docid(min);
        self.right.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        let a = self.left.node_ref().get_qwords(registry);
        let b = self.right.node_ref().get_qwords(registry);
        a.max(b)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.left.node_mut().set_qwords_idf(registry);
        self.right.node_mut().set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.left.node_ref().get_terms(registry, out);
        self.right.node_ref().get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.left.node_ref().got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.left.node_ref().debug_word_id()
    }
}

/// AND restricted to hit pairs that lie in the same instance of a named
/// zone (spec.md §4.2.3 "AND-zonespan"). The zone check is injected as a
/// closure so this node does not need to own a [`crate::zone::ZoneEngine`]
/// directly; the ranker wires the real one in at construction.
pub struct AndZonespanNode {
    inner: AndNode,
    same_zone: Box<dyn FnMut(DocId, crate::hitpos::Hitpos, crate::hitpos::Hitpos) -> bool>,
    filtered: Vec<ExtHit>,
    filtered_done: bool,
}

impl AndZonespanNode {
    pub fn new(
        left: BoxNode,
        right: BoxNode,
        same_zone: Box<dyn FnMut(DocId, crate::hitpos::Hitpos, crate::hitpos::Hitpos) -> bool>,
    ) -> Self {
        AndZonespanNode { inner: AndNode::new(left, right), same_zone, filtered: Vec::new(), filtered_done: false }
    }
}

impl ExtNode for AndZonespanNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        self.filtered_done = false;
        self.inner.get_docs_chunk(setup)
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.filtered_done {
            return None;
        }
        self.filtered.clear();
        while let Some(chunk) = self.inner.get_hits_chunk(docs, setup) {
            let mut i = 0;
            while i < chunk.len() {
                let mut j = i;
                while j < chunk.len() && chunk[j].docid == chunk[i].docid {
                    j += 1;
                }
                let group = &chunk[i..j];
                for a in group.iter().filter(|h| h.nodepos == 0) {
                    for b in group.iter().filter(|h| h.nodepos == 1) {
                        if (self.same_zone)(a.docid, a.hitpos, b.hitpos) {
                            self.filtered.push(*a);
                            self.filtered.push(*b);
                        }
                    }
                }
                i = j;
            }
        }
        self.filtered_done = true;
        if self.filtered.is_empty() {
            None
        } else {
            Some(&self.filtered)
        }
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.inner.reset(setup);
        self.filtered.clear();
        self.filtered_done = false;
    }

    fn hint_docid(&mut self, min: DocId) {
        self.inner.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        self.inner.get_qwords(registry)
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.inner.set_qwords_idf(registry);
    }

    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>) {
        self.inner.get_terms(registry, out);
    }

    fn got_hitless(&self) -> bool {
        self.inner.got_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.inner.debug_word_id()
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

    fn drain_docs(node: &mut dyn ExtNode, ns: &NodeSetup<'_>) -> Vec<DocId> {
        let mut out = Vec::new();
        while let Some(chunk) = node.get_docs_chunk(ns) {
            out.extend(chunk.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid));
        }
        out
    }

    #[test]
    fn and_is_commutative_on_docid_set() {
        let a = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)]), (3, 1, vec![hp(0)])], 1);
        let b = term(vec![(2, 1, vec![hp(0)]), (3, 1, vec![hp(0)]), (4, 1, vec![hp(0)])], 2);
        let a2 = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)]), (3, 1, vec![hp(0)])], 1);
        let b2 = term(vec![(2, 1, vec![hp(0)]), (3, 1, vec![hp(0)]), (4, 1, vec![hp(0)])], 2);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut forward = AndNode::new(a, b);
        let mut backward = AndNode::new(b2, a2);
        assert_eq!(drain_docs(&mut forward, &ns), vec![2, 3]);
        assert_eq!(drain_docs(&mut backward, &ns), vec![2, 3]);
    }

    #[test]
    fn or_is_identity_with_empty_right() {
        let a = term(vec![(1, 1, vec![hp(0)]), (5, 1, vec![hp(0)])], 1);
        let b = term(vec![], 2);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut node = OrNode::new(a, b);
        assert_eq!(drain_docs(&mut node, &ns), vec![1, 5]);
    }

    #[test]
    fn andnot_is_set_difference_and_falls_through_to_passthrough() {
        let a = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)]), (3, 1, vec![hp(0)]), (4, 1, vec![hp(0)])], 1);
        let b = term(vec![(3, 1, vec![hp(0)])], 2);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut node = AndNotNode::new(a, b);
        assert_eq!(drain_docs(&mut node, &ns), vec![1, 2, 4]);
    }

    #[test]
    fn maybe_keeps_every_left_doc() {
        let a = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)])], 1);
        let b = term(vec![(2, 1, vec![hp(0)])], 2);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut node = MaybeNode::new(a, b);
        assert_eq!(drain_docs(&mut node, &ns), vec![1, 2]);
    }

    #[test]
    fn a_or_b_andnot_c_matches_the_worked_example() {
        // (a | b) & !c, docs: a in {1,2,3}, b in {2,4}, c in {3}. Expected {1,2,4}.
        let a = term(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)]), (3, 1, vec![hp(0)])], 1);
        let b = term(vec![(2, 1, vec![hp(0)]), (4, 1, vec![hp(0)])], 2);
        let c = term(vec![(3, 1, vec![hp(0)])], 3);
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let or_node: BoxNode = Box::new(OrNode::new(a, b));
        let mut node = AndNotNode::new(or_node, c);
        assert_eq!(drain_docs(&mut node, &ns), vec![1, 2, 4]);
    }
}
