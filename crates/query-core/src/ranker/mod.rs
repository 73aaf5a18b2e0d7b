//! L3 rankers (spec.md §4.4): drive the operator tree, accumulate per-doc
//! state through a pluggable [`RankerState`], and emit [`Match`] records
//! for the coordinator to push into a sorter.
//!
//! Grounded on `crates/milli/src/search/new/ranking_rules.rs`'s
//! `RankingRule` trait: a node that is reset against a context and then
//! pulled repeatedly for buckets of output, exactly mirrored here by
//! [`Ranker::drain_batch`] pulling docs/hits chunks instead of candidate
//! buckets.

pub mod expr;
pub mod export;
pub mod factors;
pub mod plugin;
pub mod proximity;
pub mod simple;

use std::collections::HashMap;

use crate::budget::ExecutionContext;
use crate::constants::MAX_DOCS;
use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::extdoc::ExtDoc;
use crate::operators::{BoxNode, NodeSetup};
use crate::schema::Schema;
use crate::warnings::WarningSink;

/// A dynamic (computed) attribute value a ranker state may stash on a
/// match (`@expr`, `@geodist`, factor-pool exports, …).
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicValue {
    Int(i64),
    Float(f64),
    Str(String),
    /// A multi-value attribute (uint32-set/int64-set), read once per
    /// document and fanned out by the MVA group sorter.
    IntVec(Vec<i64>),
}

/// One ranked candidate, as handed off to the sorter (spec.md §4.4
/// "Emits matches into a fixed-size buffer").
#[derive(Debug, Clone)]
pub struct Match {
    pub docid: DocId,
    pub weight: i64,
    pub field_mask: u64,
    pub dynamic: HashMap<String, DynamicValue>,
}

impl Match {
    pub fn new(docid: DocId) -> Self {
        Match { docid, weight: 0, field_mask: 0, dynamic: HashMap::new() }
    }

    pub fn set_dynamic(&mut self, name: impl Into<String>, value: DynamicValue) {
        self.dynamic.insert(name.into(), value);
    }
}

/// Per-document, per-field token counts the ranker needs for BM25A/BM25F
/// length normalization (spec.md §4.5 "Finalize(match)").
#[derive(Debug, Clone, Copy)]
pub struct FieldLens<'a>(pub &'a [f32]);

impl FieldLens<'_> {
    pub fn avgdl(&self) -> f32 {
        if self.0.is_empty() {
            return 0.0;
        }
        self.0.iter().sum::<f32>() / self.0.len() as f32
    }

    pub fn len(&self, field: u32) -> f32 {
        self.0.get(field as usize).copied().unwrap_or(0.0)
    }
}

/// The index-reader contract a ranker pulls from (spec.md §6, "Inbound:
/// index-reader contracts"). Attribute filter push-down, schema, field
/// lengths and corpus stats are all owned by the embedder; the core only
/// ever reads through this trait.
pub trait RankerIndex {
    fn early_reject(&self, exec: &ExecutionContext, candidate: &Match) -> bool;
    fn get_match_schema(&self) -> &Schema;
    fn get_field_lens(&self, docid: DocId) -> FieldLens<'_>;
    fn total_docs(&self) -> u64;
    fn total_hits(&self) -> u64;
}

/// Per-document ranking state (spec.md §4.4 "State object differences").
/// A ranker variant is exactly one `RankerState` impl plugged into the
/// common drain loop of [`Ranker`].
pub trait RankerState {
    /// Called once per document before its first hit, after any leftover
    /// state from the previous document has been finalized.
    fn start_doc(&mut self, docid: DocId);

    /// Called once per hit belonging to the current document, in
    /// ascending `(hitpos, querypos)` order (spec.md §8 property 3).
    fn update(&mut self, hit: &ExtHit, field_weight: &[f32]);

    /// Called once at the document boundary. Returns the final weight and
    /// may stash computed factors onto `match_` as dynamic attributes
    /// (spec.md §4.4 "free to mutate a per-doc dynamic attribute").
    fn finalize(&mut self, match_: &mut Match, lens: FieldLens<'_>) -> i64;
}

/// Drives an operator tree through a [`RankerState`], producing [`Match`]
/// records in fixed-size batches (spec.md §4.4).
pub struct Ranker<S: RankerState> {
    root: BoxNode,
    state: S,
    field_weight: Vec<f32>,
    out: Vec<Match>,
}

impl<S: RankerState> Ranker<S> {
    pub fn new(root: BoxNode, state: S, field_weight: Vec<f32>) -> Self {
        Ranker { root, state, field_weight, out: Vec::with_capacity(MAX_DOCS) }
    }

    pub fn reset(&mut self, setup: &NodeSetup<'_>) {
        self.root.reset(setup);
    }

    /// Pulls one or more docs chunks and their hits, finalizing each
    /// document in turn, until the root signals end-of-stream or enough
    /// matches have accumulated to fill a batch. Returns an empty vec at
    /// true end-of-stream.
    pub fn drain_batch(&mut self, setup: &NodeSetup<'_>, index: &dyn RankerIndex) -> Vec<Match> {
        self.out.clear();
        while let Some(docs_chunk) = self.root.get_docs_chunk(setup) {
            let docs_chunk: Vec<ExtDoc> = docs_chunk.to_vec();
            let mut accepted: Vec<ExtDoc> = Vec::new();
            for doc in docs_chunk.iter().filter(|d| !d.is_sentinel()) {
                let candidate = Match { field_mask: doc.field_mask, ..Match::new(doc.docid) };
                if !index.early_reject(setup.exec, &candidate) {
                    accepted.push(*doc);
                }
            }
            if accepted.is_empty() {
                // still have to drain this chunk's hits before pulling the
                // next one (chunk coupling, spec.md §4.2).
                while self.root.get_hits_chunk(&docs_chunk, setup).is_some() {}
                continue;
            }
            accepted.push(ExtDoc::SENTINEL);

            let mut current: Option<Match> = None;
            while let Some(hits) = self.root.get_hits_chunk(&accepted, setup) {
                let hits: Vec<ExtHit> = hits.to_vec();
                for hit in &hits {
                    let boundary = match &current {
                        Some(m) => m.docid != hit.docid,
                        None => true,
                    };
                    if boundary {
                        if let Some(mut m) = current.take() {
                            self.finalize_into(&mut m, index);
                            self.out.push(m);
                        }
                        self.state.start_doc(hit.docid);
                        current = Some(Match::new(hit.docid));
                    }
                    self.state.update(hit, &self.field_weight);
                }
            }
            if let Some(mut m) = current.take() {
                self.finalize_into(&mut m, index);
                self.out.push(m);
            }
            if self.out.len() >= MAX_DOCS {
                break;
            }
        }
        std::mem::take(&mut self.out)
    }

    fn finalize_into(&mut self, m: &mut Match, index: &dyn RankerIndex) {
        let lens = index.get_field_lens(m.docid);
        m.weight = self.state.finalize(m, lens);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub struct FixedIndex {
        pub schema: Schema,
        pub lens: Vec<f32>,
        pub total_docs: u64,
        pub total_hits: u64,
    }

    impl RankerIndex for FixedIndex {
        fn early_reject(&self, _exec: &ExecutionContext, _candidate: &Match) -> bool {
            false
        }

        fn get_match_schema(&self) -> &Schema {
            &self.schema
        }

        fn get_field_lens(&self, _docid: DocId) -> FieldLens<'_> {
            FieldLens(&self.lens)
        }

        fn total_docs(&self) -> u64 {
            self.total_docs
        }

        fn total_hits(&self) -> u64 {
            self.total_hits
        }
    }

    impl Default for FixedIndex {
        fn default() -> Self {
            FixedIndex { schema: Schema::new(), lens: vec![10.0, 10.0], total_docs: 100, total_hits: 1000 }
        }
    }
}
