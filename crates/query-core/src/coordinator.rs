//! L5 query coordinator: builds the operator tree from a parsed query,
//! resolves per-term IDF, drives a ranker to completion and folds its
//! matches into a sorter.
//!
//! Grounded on `crates/milli/src/search/new/mod.rs`'s `execute_search` top
//! level drive loop: build the ranking-rule graph, iterate it to
//! completion into buckets, collect into a result. Here "ranking-rule
//! graph" is the operator tree plus [`crate::ranker::Ranker`], and
//! "buckets" are [`crate::ranker::Ranker::drain_batch`] batches folded
//! directly into a [`crate::sorter::Sorter`].

use crate::budget::ExecutionContext;
use crate::operators::NodeSetup;
use crate::query_tree::{QueryNode, QueryTreeBuilder};
use crate::ranker::{Match, Ranker, RankerIndex, RankerState};
use crate::registry::{QwordRegistry, QwordSetup};
use crate::scope::MatchScope;
use crate::sorter::Sorter;
use crate::warnings::WarningSink;
use crate::qword::Qword;

/// Resolves document-frequency statistics for every keyword the builder
/// interned, then computes IDF (spec.md §4.1, §6 "Inbound: dictionary/Qword
/// factory"). A second lightweight spawn per unique word: the tree's own
/// leaves already hold a fully set-up cursor, but that cursor is owned by
/// the tree once built, not reachable from here, so the coordinator asks
/// the factory once more, by word, purely for `docs()`/`hits()`.
fn compute_idfs<S: QwordSetup>(factory: &S, registry: &mut QwordRegistry, total_docs: u64) {
    for idx in 0..registry.len() {
        let word = registry.get(idx).word.clone();
        let mut probe = factory.spawn(&word);
        factory.setup(&mut probe);
        registry.set_qword_stats(idx, probe.docs(), probe.hits(), total_docs);
    }
}

/// Drives one query end to end: parse tree in, ranked-and-sorted matches
/// out.
pub struct QueryCoordinator {
    pub exec: ExecutionContext,
    pub warnings: WarningSink,
}

impl QueryCoordinator {
    pub fn new(exec: ExecutionContext) -> Self {
        QueryCoordinator { exec, warnings: WarningSink::new() }
    }

    /// Runs `node` to completion against `factory`/`index`, folding every
    /// produced [`Match`] into `sorter`. Returns the number of matches
    /// pushed (before any sorter-side eviction), mirroring the `flatten`
    /// contract's own return-count convention.
    pub fn execute<S, R>(
        &self,
        factory: &S,
        node: &QueryNode,
        scope: &MatchScope,
        ranker_state: R,
        field_weight: Vec<f32>,
        index: &dyn RankerIndex,
        sorter: &mut dyn Sorter,
    ) -> crate::error::Result<usize>
    where
        S: QwordSetup,
        S::W: 'static,
        R: RankerState,
    {
        let mut registry = QwordRegistry::new();
        let mut builder = QueryTreeBuilder::new(&mut registry, &self.warnings);
        let mut root = builder.build(factory, node, scope)?;

        compute_idfs(factory, &mut registry, index.total_docs());
        root.set_qwords_idf(&registry);

        let mut ranker = Ranker::new(root, ranker_state, field_weight);
        let setup = NodeSetup { exec: &self.exec, warnings: &self.warnings };
        ranker.reset(&setup);

        let mut total = 0usize;
        loop {
            let batch = ranker.drain_batch(&setup, index);
            if batch.is_empty() {
                break;
            }
            for m in batch {
                total += 1;
                sorter.push(m);
            }
            if self.exec.should_stop().is_some() {
                break;
            }
        }
        Ok(total)
    }

    /// Drains `sorter` into a flat, comparator-ordered `Vec<Match>`,
    /// applying an optional HAVING predicate (spec.md §4.6 "HAVING").
    pub fn collect(&self, sorter: &mut dyn Sorter, having: Option<&dyn Fn(&Match) -> bool>) -> Vec<Match> {
        let mut out = Vec::new();
        sorter.flatten(&mut out, having);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitpos::Hitpos;
    use crate::qword::InMemoryQword;
    use crate::query_tree::Keyword;
    use crate::ranker::simple::NoneState;
    use crate::ranker::test_support::FixedIndex;
    use crate::sorter::heap::HeapSorter;
    use crate::sorter::{Comparator, KeypartSpec};

    struct FakeDictionary;

    fn kw(word: &str, pos: u32) -> Keyword {
        Keyword {
            word: word.to_string(),
            dict_word: word.to_string(),
            atom_pos: pos,
            field_start: false,
            field_end: false,
            boost: 1.0,
            expanded: false,
            excluded: false,
            morphed: false,
            payload: false,
        }
    }

    impl QwordSetup for FakeDictionary {
        type W = InMemoryQword;

        fn spawn(&self, keyword: &str) -> InMemoryQword {
            let postings = match keyword {
                "fox" => vec![(1, 1, vec![Hitpos::new(0, 0, false)]), (2, 1, vec![Hitpos::new(0, 1, false)])],
                "dog" => vec![(2, 1, vec![Hitpos::new(0, 5, false)])],
                _ => vec![],
            };
            InMemoryQword::new(postings, false)
        }

        fn setup(&self, qword: &mut InMemoryQword) -> bool {
            qword.docs_count() > 0
        }

        fn hitlist_is_inline(&self) -> bool {
            true
        }
    }

    #[test]
    fn executes_and_or_query_end_to_end() {
        let dict = FakeDictionary;
        let query = QueryNode::Or(vec![QueryNode::Keyword(kw("fox", 1)), QueryNode::Keyword(kw("dog", 2))]);
        let coordinator = QueryCoordinator::new(ExecutionContext::unbounded());
        let index = FixedIndex::default();
        let comparator = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut sorter = HeapSorter::new(comparator, 10);

        let pushed = coordinator
            .execute(&dict, &query, &MatchScope::all_fields(), NoneState, vec![1.0], &index, &mut sorter)
            .unwrap();
        assert_eq!(pushed, 2);

        let results = coordinator.collect(&mut sorter, None);
        let docids: Vec<_> = results.iter().map(|m| m.docid).collect();
        assert_eq!(docids, vec![1, 2]);
    }
}
