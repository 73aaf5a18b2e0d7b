//! L2 operator tree (spec.md §4.2).
//!
//! Every node implements [`ExtNode`], grounded on
//! `crates/milli/src/search/new/ranking_rules.rs`'s `RankingRule` trait:
//! both describe a node that is first reset against a context, then pulled
//! repeatedly until it signals end-of-stream, with cancellation/deadline
//! checks threaded through every call instead of raised as exceptions.

pub mod bool_ops;
pub mod cache;
pub mod filter;
pub mod near;
pub mod nway;
pub mod order;
pub mod phrase;
pub mod proximity;
pub mod quorum;
pub mod term;
pub mod unit;

use crate::budget::ExecutionContext;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::registry::QwordRegistry;
use crate::warnings::WarningSink;

/// Context threaded through `reset` and every pull, carrying the shared
/// cancellation/deadline/budget state and the warning sink every leaf
/// writes to (spec.md §4.2, "Interruption & budget").
pub struct NodeSetup<'a> {
    pub exec: &'a ExecutionContext,
    pub warnings: &'a WarningSink,
}

/// A composable streaming node over postings: terms, boolean combinators,
/// the N-way positional family, quorum, ORDER, UNIT, zone/field filters,
/// the cache proxy, and the payload (expanded-keyword) variant.
pub trait ExtNode {
    /// Returns up to [`crate::constants::MAX_DOCS`] documents terminated
    /// by a sentinel, or `None` at end of stream / on interruption.
    /// Docids within the returned slice are strictly ascending
    /// (spec.md §8 property 1); consecutive non-`None` calls return
    /// strictly increasing docids (property 2).
    fn get_docs_chunk(&mut self, setup: &NodeSetup<'_>) -> Option<&[ExtDoc]>;

    /// Returns hits covering ids in the docs chunk most recently returned
    /// by `get_docs_chunk`. May be called repeatedly until it returns
    /// `None`, at which point the caller must pull the next docs chunk
    /// before calling this again (spec.md §4.2, "Chunk coupling").
    fn get_hits_chunk(&mut self, docs: &[ExtDoc], setup: &NodeSetup<'_>) -> Option<&[ExtHit]>;

    /// Resets the node (and, transitively, every child it exclusively
    /// owns) to the start of its stream.
    fn reset(&mut self, setup: &NodeSetup<'_>);

    /// Skips ahead so that the next emitted docid is `>= min`.
    fn hint_docid(&mut self, min: DocId);

    /// Registers every keyword this node (and its children) reaches,
    /// returning the maximum atom position among them.
    fn get_qwords(&self, registry: &mut QwordRegistry) -> u32;

    /// Propagates freshly computed IDFs down to every leaf. Idempotent
    /// (spec.md §8 property 5).
    fn set_qwords_idf(&mut self, registry: &QwordRegistry);

    /// Collects this node's underlying dictionary words into `out`,
    /// de-duplicating via `registry`.
    fn get_terms(&self, registry: &QwordRegistry, out: &mut Vec<String>);

    /// `true` if this node (or a descendant) has no real hitlist and
    /// synthesizes hits from a field mask instead.
    fn got_hitless(&self) -> bool;

    /// Opaque identifier for debug dumps; not part of any ordering
    /// invariant.
    fn debug_word_id(&self) -> u64;
}

pub type BoxNode = Box<dyn ExtNode>;

/// Buffers one child's docs-chunk stream so that combinators can compare
/// "current docid" across two or more children without re-pulling a fresh
/// chunk on every comparison. Hits for the chunk currently buffered are
/// materialized lazily and cached until the chunk advances.
///
/// Grounded on `crates/milli/src/search/new/ranking_rules.rs`'s
/// `RankingRuleQueryTrait`-driven bucket cursors, which similarly keep one
/// fetched batch per child alive across a merge step.
pub(crate) struct DocCursor {
    node: BoxNode,
    buf: Vec<ExtDoc>,
    idx: usize,
    exhausted: bool,
    hits_cache: Option<Vec<ExtHit>>,
}

impl DocCursor {
    pub(crate) fn new(node: BoxNode) -> Self {
        DocCursor { node, buf: Vec::new(), idx: 0, exhausted: false, hits_cache: None }
    }

    fn logical_len(&self) -> usize {
        if self.buf.is_empty() {
            0
        } else {
            self.buf.len() - 1
        }
    }

    fn ensure_chunk(&mut self, setup: &NodeSetup<'_>) -> bool {
        if self.idx < self.logical_len() {
            return true;
        }
        if self.exhausted {
            return false;
        }
        match self.node.get_docs_chunk(setup) {
            Some(chunk) => {
                self.buf = chunk.to_vec();
                self.idx = 0;
                self.hits_cache = None;
                true
            }
            None => {
                self.exhausted = true;
                self.buf.clear();
                self.idx = 0;
                self.hits_cache = None;
                false
            }
        }
    }

    /// The current doc the cursor sits on, pulling fresh chunks as needed.
    pub(crate) fn current(&mut self, setup: &NodeSetup<'_>) -> Option<ExtDoc> {
        if !self.ensure_chunk(setup) {
            return None;
        }
        Some(self.buf[self.idx])
    }

    pub(crate) fn advance(&mut self) {
        self.idx += 1;
    }

    pub(crate) fn hint_docid(&mut self, min: DocId) {
        self.node.hint_docid(min);
        self.buf.clear();
        self.idx = 0;
        self.exhausted = false;
        self.hits_cache = None;
    }

    pub(crate) fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.node.reset(setup);
        self.buf.clear();
        self.idx = 0;
        self.exhausted = false;
        self.hits_cache = None;
    }

    /// All hits the child produced for the chunk currently buffered,
    /// filtered to one docid. Materializes the whole chunk's hits on first
    /// call (mirroring `term::TermNode`'s per-chunk materialization) and
    /// reuses the cache for subsequent docids in the same chunk.
    pub(crate) fn hits_for_doc(&mut self, docid: DocId, setup: &NodeSetup<'_>) -> Vec<ExtHit> {
        if self.hits_cache.is_none() {
            let mut all = Vec::new();
            while let Some(chunk) = self.node.get_hits_chunk(&self.buf, setup) {
                all.extend_from_slice(chunk);
            }
            self.hits_cache = Some(all);
        }
        self.hits_cache
            .as_ref()
            .unwrap()
            .iter()
            .copied()
            .filter(|h| h.docid == docid)
            .collect()
    }

    pub(crate) fn node_mut(&mut self) -> &mut BoxNode {
        &mut self.node
    }

    pub(crate) fn node_ref(&self) -> &BoxNode {
        &self.node
    }
}

/// Shared pagination state for nodes that materialize a whole hits batch up
/// front and then serve it back in [`crate::constants::MAX_HITS`]-sized
/// slices, the pattern `term::TermNode` established for its own leaf hits.
pub(crate) struct HitsPager {
    pub(crate) scratch: Vec<ExtHit>,
    pub(crate) cursor: usize,
    out: Vec<ExtHit>,
}

impl HitsPager {
    pub(crate) fn new() -> Self {
        HitsPager { scratch: Vec::new(), cursor: 0, out: Vec::new() }
    }

    pub(crate) fn reset(&mut self) {
        self.scratch.clear();
        self.cursor = 0;
    }

    pub(crate) fn is_fresh(&self) -> bool {
        self.cursor == 0 && self.scratch.is_empty()
    }

    pub(crate) fn page(&mut self, max_hits: usize, exec: &ExecutionContext) -> Option<&[ExtHit]> {
        if self.cursor >= self.scratch.len() {
            self.scratch.clear();
            self.cursor = 0;
            return None;
        }
        self.out.clear();
        let end = (self.cursor + max_hits).min(self.scratch.len());
        self.out.extend_from_slice(&self.scratch[self.cursor..end]);
        self.cursor = end;
        exec.budget.charge_hits(self.out.len());
        Some(&self.out)
    }
}
