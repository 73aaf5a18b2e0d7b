//! Term leaf (spec.md §4.2.1): emits docs and hits directly from a Qword.

use crate::constants::{MAX_DOCS, MAX_HITS};
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::hitpos::Hitpos;
use crate::operators::{ExtNode, NodeSetup};
use crate::qword::{Qword, QwordMatch};
use crate::registry::QwordRegistry;
use crate::scope::MatchScope;

/// Emits docs and hits straight from a [`Qword`], applying the node's
/// [`MatchScope`] field-mask filter at the leaf (spec.md §4.2.9) and
/// synthesizing hits from the field mask when the underlying index has no
/// hitlist (spec.md §4.2.1 "Hitless variant").
pub struct TermNode<Q: Qword> {
    qword: Q,
    scope: MatchScope,
    registry_idx: usize,
    query_pos: u32,
    dict_word: String,
    docs_buf: Vec<ExtDoc>,
    doc_matches: Vec<QwordMatch>,
    hits_scratch: Vec<ExtHit>,
    hits_cursor: usize,
    hits_out: Vec<ExtHit>,
}

impl<Q: Qword> TermNode<Q> {
    pub fn new(
        qword: Q,
        scope: MatchScope,
        registry_idx: usize,
        query_pos: u32,
        dict_word: impl Into<String>,
    ) -> Self {
        TermNode {
            qword,
            scope,
            registry_idx,
            query_pos,
            dict_word: dict_word.into(),
            docs_buf: Vec::with_capacity(MAX_DOCS + 1),
            doc_matches: Vec::with_capacity(MAX_DOCS),
            hits_scratch: Vec::new(),
            hits_cursor: 0,
            hits_out: Vec::with_capacity(MAX_HITS + 1),
        }
    }

    fn accepted_field_mask(&self, fields_mask: u64) -> u64 {
        if self.scope.is_wide_fields() {
            // wide-field indexes: a 64-bit mask cannot represent every
            // field, so every field the doc matched is provisionally kept
            // and narrowed again per-hit in `get_hits_chunk`.
            fields_mask
        } else {
            fields_mask & self.scope.field_mask
        }
    }
}

impl<Q: Qword> ExtNode for TermNode<Q> {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.docs_buf.clear();
        self.doc_matches.clear();
        while self.docs_buf.len() < MAX_DOCS {
            let m = self.qword.next_doc();
            if m.is_end_of_stream() {
                break;
            }
            let accepted_mask = self.accepted_field_mask(m.fields_mask);
            if accepted_mask == 0 {
                continue;
            }
            if !setup.exec.budget.charge_docs(1) {
                setup.warnings.warn("query budget exhausted while reading term postings");
                break;
            }
            let mut doc = ExtDoc::new(m.docid);
            doc.field_mask = accepted_mask;
            doc.tf_idf = self.qword.idf();
            self.docs_buf.push(doc);
            self.doc_matches.push(m);
        }
        if self.docs_buf.is_empty() {
            return None;
        }
        self.docs_buf.push(ExtDoc::SENTINEL);
        Some(&self.docs_buf)
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        if self.hits_cursor == 0 && self.hits_scratch.is_empty() {
            // first call for this docs chunk: materialize every hit.
            let query_pos = self.query_pos;
            for (doc, m) in docs.iter().zip(self.doc_matches.iter()) {
                if doc.is_sentinel() {
                    continue;
                }
                if self.qword.is_hitless() {
                    for field in 0..64u32 {
                        if (doc.field_mask >> field) & 1 != 0 {
                            let hitpos = Hitpos::new(field, 0, false);
                            self.hits_scratch.push(ExtHit::single(doc.docid, hitpos, query_pos));
                        }
                    }
                    continue;
                }
                self.qword.seek_hitlist(m.hitlist_position);
                loop {
                    let hit = self.qword.next_hit();
                    if hit.is_empty() {
                        break;
                    }
                    if !self.scope.accepts_field(hit.field()) {
                        continue;
                    }
                    self.hits_scratch.push(ExtHit::single(doc.docid, hit, query_pos));
                }
            }
        }
        if self.hits_cursor >= self.hits_scratch.len() {
            self.hits_scratch.clear();
            self.hits_cursor = 0;
            return None;
        }
        if let Some(reason) = setup.exec.should_stop() {
            setup.warnings.warn(reason);
            return None;
        }
        self.hits_out.clear();
        let end = (self.hits_cursor + MAX_HITS).min(self.hits_scratch.len());
        self.hits_out.extend_from_slice(&self.hits_scratch[self.hits_cursor..end]);
        self.hits_cursor = end;
        setup.exec.budget.charge_hits(self.hits_out.len());
        Some(&self.hits_out)
    }

    fn reset(&mut self, _setup: &NodeSetup<'_>) {
        self.qword.reset();
        self.docs_buf.clear();
        self.doc_matches.clear();
        self.hits_scratch.clear();
        self.hits_cursor = 0;
    }

    fn hint_docid(&mut self, min: DocId) {
        self.qword.hint_docid(min);
    }

    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32 {
        registry.get(self.registry_idx).query_pos
    }

    fn set_qwords_idf(&mut self, registry: &QwordRegistry) {
        self.qword.set_idf(registry.get(self.registry_idx).idf);
    }

    fn get_terms(&self, _registry: &QwordRegistry, out: &mut Vec<String>) {
        if !out.contains(&self.dict_word) {
            out.push(self.dict_word.clone());
        }
    }

    fn got_hitless(&self) -> bool {
        self.qword.is_hitless()
    }

    fn debug_word_id(&self) -> u64 {
        self.registry_idx as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionContext;
    use crate::qword::InMemoryQword;
    use crate::warnings::WarningSink;

    fn hp(pos: u32) -> Hitpos {
        Hitpos::new(0, pos, false)
    }

    fn setup() -> (ExecutionContext, WarningSink) {
        (ExecutionContext::unbounded(), WarningSink::new())
    }

    #[test]
    fn streams_docs_then_terminates() {
        let qword = InMemoryQword::new(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(1)])], false);
        let mut node = TermNode::new(qword, MatchScope::all_fields(), 0, 1, "fox");
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let chunk = node.get_docs_chunk(&ns).unwrap();
        let ids: Vec<_> = chunk.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
        assert_eq!(ids, vec![1, 2]);
        assert!(node.get_docs_chunk(&ns).is_none());
    }

    #[test]
    fn hits_chunk_respects_field_mask() {
        let qword = InMemoryQword::new(vec![(1, 0b11, vec![hp(0), Hitpos::new(1, 0, false)])], false);
        let scope = MatchScope::with_field_mask(0b01);
        let mut node = TermNode::new(qword, scope, 0, 1, "fox");
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let docs_owned: Vec<ExtDoc> = node.get_docs_chunk(&ns).unwrap().to_vec();
        let hits = node.get_hits_chunk(&docs_owned, &ns).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].hitpos.field(), 0);
    }

    #[test]
    fn reset_round_trips() {
        let qword = InMemoryQword::new(vec![(1, 1, vec![hp(0)])], false);
        let mut node = TermNode::new(qword, MatchScope::all_fields(), 0, 1, "fox");
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let first: Vec<DocId> =
            node.get_docs_chunk(&ns).unwrap().iter().map(|d| d.docid).collect();
        node.reset(&ns);
        let second: Vec<DocId> =
            node.get_docs_chunk(&ns).unwrap().iter().map(|d| d.docid).collect();
        assert_eq!(first, second);
    }
}
