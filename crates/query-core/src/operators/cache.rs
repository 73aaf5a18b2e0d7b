//! Cache proxy (spec.md §4.2.8): captures an entire doc+hit stream on first
//! drain into arrays, bounded by a byte budget, and serves subsequent
//! drains from those arrays instead of re-pulling the child. Exceeding the
//! budget invalidates the cache and falls back to live pull for the rest
//! of that drain (and every drain after, since the cache never refills
//! once invalidated).

use std::mem::size_of;

use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::operators::{BoxNode, ExtNode, NodeSetup};
use crate::registry::QwordRegistry;

pub struct CacheBudget {
    pub doc_bytes: usize,
    pub hit_bytes: usize,
}

enum State {
    /// Still live-pulling from `child`, mirroring into the cache arrays
    /// unless the budget trips.
    Filling { doc_cursor: usize, hit_cursor: usize },
    /// Serving from `docs`/`hits` only.
    Cached,
    /// Budget exceeded: cache dropped, proxy forwards to `child` directly
    /// for the remainder of its lifetime.
    Invalid,
}

pub struct CacheProxyNode {
    child: BoxNode,
    budget: CacheBudget,
    docs: Vec<ExtDoc>,
    hits: Vec<ExtHit>,
    state: State,
    replay_doc_idx: usize,
    replay_hit_idx: usize,
    out_docs: Vec<ExtDoc>,
    out_hits: Vec<ExtHit>,
}

impl CacheProxyNode {
    pub fn new(child: BoxNode, budget: CacheBudget) -> Self {
        CacheProxyNode {
            child,
            budget,
            docs: Vec::new(),
            hits: Vec::new(),
            state: State::Filling { doc_cursor: 0, hit_cursor: 0 },
            replay_doc_idx: 0,
            replay_hit_idx: 0,
            out_docs: Vec::new(),
            out_hits: Vec::new(),
        }
    }

    fn over_budget(&self) -> bool {
        self.docs.len() * size_of::<ExtDoc>() > self.budget.doc_bytes
            || self.hits.len() * size_of::<ExtHit>() > self.budget.hit_bytes
    }
}

impl ExtNode for CacheProxyNode {
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]> {
        match self.state {
            State::Invalid => self.child.get_docs_chunk(setup),
            State::Cached => {
                if self.replay_doc_idx >= self.docs.len() {
                    return None;
                }
                let end = self.docs[self.replay_doc_idx..]
                    .iter()
                    .position(|d| d.is_sentinel())
                    .map(|p| self.replay_doc_idx + p + 1)
                    .unwrap_or(self.docs.len());
                self.out_docs.clear();
                self.out_docs.extend_from_slice(&self.docs[self.replay_doc_idx..end]);
                self.replay_doc_idx = end;
                Some(&self.out_docs)
            }
            State::Filling { .. } => match self.child.get_docs_chunk(setup) {
                Some(chunk) => {
                    let start = self.docs.len();
                    self.docs.extend_from_slice(chunk);
                    if self.over_budget() {
                        self.state = State::Invalid;
                    }
                    Some(&self.docs[start..])
                }
                None => {
                    self.state = State::Cached;
                    self.replay_doc_idx = 0;
                    None
                }
            },
        }
    }

    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]> {
        match self.state {
            State::Invalid => self.child.get_hits_chunk(docs, setup),
            State::Cached => {
                if self.replay_hit_idx >= self.hits.len() {
                    return None;
                }
                let known_ids: std::collections::HashSet<DocId> =
                    docs.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid).collect();
                let end = self.hits[self.replay_hit_idx..]
                    .iter()
                    .take_while(|h| known_ids.contains(&h.docid))
                    .count()
                    + self.replay_hit_idx;
                if end == self.replay_hit_idx {
                    return None;
                }
                self.out_hits.clear();
                self.out_hits.extend_from_slice(&self.hits[self.replay_hit_idx..end]);
                self.replay_hit_idx = end;
                Some(&self.out_hits)
            }
            State::Filling { .. } => match self.child.get_hits_chunk(docs, setup) {
                Some(chunk) => {
                    let start = self.hits.len();
                    self.hits.extend_from_slice(chunk);
                    if self.over_budget() {
                        self.state = State::Invalid;
                    }
                    Some(&self.hits[start..])
                }
                None => None,
            },
        }
    }

    fn reset(&mut self, setup: &NodeSetup<'_>) {
        match self.state {
            State::Invalid => self.child.reset(setup),
            State::Filling { .. } => {
                self.child.reset(setup);
                self.docs.clear();
                self.hits.clear();
            }
            State::Cached => {
                self.replay_doc_idx = 0;
                self.replay_hit_idx = 0;
            }
        }
    }

    fn hint_docid(&mut self, min: DocId) {
        // the cache's whole point is serving the same stream to every
        // sibling; a seek hint would desync replay offsets, so cached
        // state degrades to invalid rather than tracking a seek position.
        if !matches!(self.state, State::Cached) {
            self.child.hint_docid(min);
        }
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

    fn term_node() -> BoxNode {
        let qword = InMemoryQword::new(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(0)])], false);
        Box::new(TermNode::new(qword, MatchScope::all_fields(), 0, 1, "w"))
    }

    #[test]
    fn second_drain_replays_from_cache() {
        let mut node = CacheProxyNode::new(term_node(), CacheBudget { doc_bytes: 1 << 20, hit_bytes: 1 << 20 });
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        let mut first = Vec::new();
        while let Some(c) = node.get_docs_chunk(&ns) {
            first.extend(c.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid));
        }
        assert_eq!(first, vec![1, 2]);
        let mut second = Vec::new();
        while let Some(c) = node.get_docs_chunk(&ns) {
            second.extend(c.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid));
        }
        assert_eq!(second, vec![1, 2]);
    }

    #[test]
    fn tiny_budget_invalidates_the_cache() {
        let mut node = CacheProxyNode::new(term_node(), CacheBudget { doc_bytes: 1, hit_bytes: 1 });
        let (exec, warnings) = setup();
        let ns = NodeSetup { exec: &exec, warnings: &warnings };
        node.get_docs_chunk(&ns);
        assert!(matches!(node.state, State::Invalid));
    }
}
