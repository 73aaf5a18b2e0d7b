//! Inbound parsed query tree (spec.md §6) and the builder that lowers it
//! into an [`ExtNode`] tree.
//!
//! Query parsing itself is out of scope (spec.md §1); this module only
//! specifies the polymorphic tree shape the parser hands over and turns it
//! into the operator tree of `crate::operators`, interning every keyword
//! into a shared [`QwordRegistry`] entry along the way.

use std::cell::RefCell;
use std::rc::Rc;

use crate::docid::DocId;
use crate::error::{Error, Result, UserError};
use crate::hitpos::Hitpos;
use crate::operators::bool_ops::{AndNode, AndNotNode, AndZonespanNode, MaybeNode, OrNode};
use crate::operators::cache::{CacheBudget, CacheProxyNode};
use crate::operators::filter::{field_end, field_limit, field_start, field_start_end, FilterNode, HitPredicate};
use crate::operators::near::NearNode;
use crate::operators::nway::NWayChild;
use crate::operators::order::OrderNode;
use crate::operators::phrase::PhraseNode;
use crate::operators::proximity::ProximityNode;
use crate::operators::quorum::{QuorumNode, QuorumThreshold};
use crate::operators::term::TermNode;
use crate::operators::unit::UnitNode;
use crate::operators::BoxNode;
use crate::registry::{QwordRegistry, QwordSetup};
use crate::scope::MatchScope;
use crate::warnings::WarningSink;
use crate::zone::{ZoneEngine, ZoneLookup};

/// One keyword leaf (spec.md §6: `{word, atom-pos, field-start?, field-end?,
/// boost, expanded?, excluded?, morphed?, payload-ptr?}`). Morphology and
/// wordform expansion are already applied by the time a tree reaches this
/// crate; `morphed` only records that fact for diagnostics.
#[derive(Debug, Clone)]
pub struct Keyword {
    pub word: String,
    pub dict_word: String,
    /// 1-based atom position in the query text.
    pub atom_pos: u32,
    pub field_start: bool,
    pub field_end: bool,
    pub boost: f32,
    pub expanded: bool,
    /// Informational: the embedder already structures exclusion via `Not`
    /// nodes under `And`; this flag is not consulted during lowering.
    pub excluded: bool,
    pub morphed: bool,
    /// Set when the query expansion step already resolved this keyword's
    /// full doc/hit set (spec.md §4.2.1 "Payload variant"); the builder
    /// wraps the leaf in a cache proxy so repeated drains replay from
    /// memory instead of re-pulling the dictionary cursor.
    pub payload: bool,
}

impl Keyword {
    pub fn new(word: impl Into<String>, atom_pos: u32) -> Self {
        let word = word.into();
        Keyword {
            dict_word: word.clone(),
            word,
            atom_pos,
            field_start: false,
            field_end: false,
            boost: 1.0,
            expanded: false,
            excluded: false,
            morphed: false,
            payload: false,
        }
    }
}

/// The inbound parsed query tree (spec.md §6), polymorphic over
/// `{AND, OR, ANDNOT, MAYBE, NOT, BEFORE, PHRASE, PROXIMITY(k), QUORUM(k|k%),
/// NEAR(k), SENTENCE, PARAGRAPH}`.
pub enum QueryNode {
    Keyword(Keyword),
    And(Vec<QueryNode>),
    Or(Vec<QueryNode>),
    AndNot(Box<QueryNode>, Box<QueryNode>),
    Maybe(Box<QueryNode>, Box<QueryNode>),
    /// Unary negation. Only meaningful as a direct operand of `And`, where
    /// the builder lowers it into an `AndNot` against the rest of the
    /// conjunction; a `Not` anywhere else has no positive set to subtract
    /// from and is rejected at build time.
    Not(Box<QueryNode>),
    Before(Vec<QueryNode>),
    Phrase(Vec<Keyword>),
    Proximity(u32, Vec<Keyword>),
    Quorum(QuorumThreshold, Vec<Keyword>),
    Near(u32, Vec<Keyword>),
    Sentence(Box<QueryNode>, Box<QueryNode>),
    Paragraph(Box<QueryNode>, Box<QueryNode>),
}

/// Lowers a [`QueryNode`] tree into an [`ExtNode`](crate::operators::ExtNode)
/// tree, interning keywords into `registry` and wiring zone checks against
/// `zone_engine` when the inherited [`MatchScope`] names zones.
///
/// `zone_names` maps a `MatchScope::zone_ids` entry to the zone name the
/// [`ZoneEngine`] was registered under; `sentence_separator`/
/// `paragraph_separator` name the dictionary words a SENTENCE/PARAGRAPH
/// node's separator term spawns.
pub struct QueryTreeBuilder<'a> {
    pub registry: &'a mut QwordRegistry,
    pub warnings: &'a WarningSink,
    pub zone_engine: Option<Rc<RefCell<ZoneEngine>>>,
    pub zone_names: Vec<String>,
    pub sentence_separator: String,
    pub paragraph_separator: String,
}

impl<'a> QueryTreeBuilder<'a> {
    pub fn new(registry: &'a mut QwordRegistry, warnings: &'a WarningSink) -> Self {
        QueryTreeBuilder {
            registry,
            warnings,
            zone_engine: None,
            zone_names: Vec::new(),
            sentence_separator: "\u{1}SENTENCE\u{1}".to_owned(),
            paragraph_separator: "\u{1}PARAGRAPH\u{1}".to_owned(),
        }
    }

    pub fn build<S>(&mut self, factory: &S, node: &QueryNode, scope: &MatchScope) -> Result<BoxNode>
    where
        S: QwordSetup,
        S::W: 'static,
    {
        match node {
            QueryNode::Keyword(k) => Ok(self.build_keyword(factory, k, scope)),
            QueryNode::Not(_) => Err(Error::User(UserError::BareNotOperator)),
            QueryNode::And(children) => self.build_and(factory, children, scope),
            QueryNode::Or(children) => {
                let mut iter = children.iter();
                let Some(first) = iter.next() else {
                    return Err(Error::User(UserError::EmptyOperator { operator: "OR" }));
                };
                let mut acc = self.build(factory, first, scope)?;
                for child in iter {
                    let next = self.build(factory, child, scope)?;
                    acc = Box::new(OrNode::new(acc, next));
                }
                Ok(acc)
            }
            QueryNode::AndNot(left, right) => {
                let left = self.build(factory, left, scope)?;
                let right = self.build(factory, right, scope)?;
                Ok(Box::new(AndNotNode::new(left, right)))
            }
            QueryNode::Maybe(left, right) => {
                let left = self.build(factory, left, scope)?;
                let right = self.build(factory, right, scope)?;
                Ok(Box::new(MaybeNode::new(left, right)))
            }
            QueryNode::Before(children) => {
                let built: Result<Vec<BoxNode>> =
                    children.iter().map(|c| self.build(factory, c, scope)).collect();
                Ok(Box::new(OrderNode::new(built?)))
            }
            QueryNode::Phrase(keywords) => {
                let children = self.build_nway_children(factory, keywords, scope);
                Ok(Box::new(PhraseNode::new(children)))
            }
            QueryNode::Proximity(distance, keywords) => {
                let children = self.build_nway_children(factory, keywords, scope);
                Ok(Box::new(ProximityNode::new(children, *distance)))
            }
            QueryNode::Near(near, keywords) => {
                let children = self.build_nway_children(factory, keywords, scope);
                Ok(Box::new(NearNode::new(children, *near)))
            }
            QueryNode::Quorum(threshold, keywords) => {
                let children: Vec<BoxNode> =
                    keywords.iter().map(|k| self.build_keyword(factory, k, scope)).collect();
                Ok(Box::new(QuorumNode::new(children, *threshold)))
            }
            QueryNode::Sentence(a, b) => {
                let a = self.build(factory, a, scope)?;
                let b = self.build(factory, b, scope)?;
                let separator_word = self.sentence_separator.clone();
                let sep = self.build_keyword(factory, &Keyword::new(separator_word, 0), scope);
                Ok(Box::new(UnitNode::new(a, b, sep)))
            }
            QueryNode::Paragraph(a, b) => {
                let a = self.build(factory, a, scope)?;
                let b = self.build(factory, b, scope)?;
                let separator_word = self.paragraph_separator.clone();
                let sep = self.build_keyword(factory, &Keyword::new(separator_word, 0), scope);
                Ok(Box::new(UnitNode::new(a, b, sep)))
            }
        }
    }

    fn build_nway_children<S>(&mut self, factory: &S, keywords: &[Keyword], scope: &MatchScope) -> Vec<NWayChild>
    where
        S: QwordSetup,
        S::W: 'static,
    {
        keywords
            .iter()
            .map(|k| NWayChild { query_pos: k.atom_pos, node: self.build_keyword(factory, k, scope) })
            .collect()
    }

    /// Splits an AND's operands into positives and `Not`-wrapped negatives,
    /// folds the positives through `AndNode` (or `AndZonespanNode` when the
    /// scope requests zonespan restriction), then subtracts every negative
    /// in turn.
    fn build_and<S>(&mut self, factory: &S, children: &[QueryNode], scope: &MatchScope) -> Result<BoxNode>
    where
        S: QwordSetup,
        S::W: 'static,
    {
        let mut positives = Vec::new();
        let mut negatives = Vec::new();
        for child in children {
            match child {
                QueryNode::Not(inner) => negatives.push(self.build(factory, inner, scope)?),
                other => positives.push(self.build(factory, other, scope)?),
            }
        }
        let mut iter = positives.into_iter();
        let Some(mut acc) = iter.next() else {
            return Err(Error::User(UserError::EmptyOperator { operator: "AND" }));
        };
        for positive in iter {
            acc = self.fold_and(acc, positive, scope);
        }
        for negative in negatives {
            acc = Box::new(AndNotNode::new(acc, negative));
        }
        Ok(acc)
    }

    fn fold_and(&self, left: BoxNode, right: BoxNode, scope: &MatchScope) -> BoxNode {
        if scope.zonespan {
            if let ([zone_id], Some(engine)) = (scope.zone_ids.as_slice(), &self.zone_engine) {
                if let Some(name) = self.zone_names.get(*zone_id as usize).cloned() {
                    let engine = Rc::clone(engine);
                    let same_zone = Box::new(move |docid: DocId, a: Hitpos, b: Hitpos| {
                        let mut engine = engine.borrow_mut();
                        engine.is_in_zone(&name, docid, a) == ZoneLookup::Found
                            && engine.is_in_zone(&name, docid, b) == ZoneLookup::Found
                    });
                    return Box::new(AndZonespanNode::new(left, right, same_zone));
                }
            }
            self.warnings.warn("zonespan requested without a single resolvable zone; falling back to plain AND");
        }
        Box::new(AndNode::new(left, right))
    }

    fn build_keyword<S>(&mut self, factory: &S, k: &Keyword, scope: &MatchScope) -> BoxNode
    where
        S: QwordSetup,
        S::W: 'static,
    {
        let registry_idx = self.registry.intern(&k.word, &k.dict_word, k.atom_pos);
        {
            let entry = self.registry.get_mut(registry_idx);
            entry.boost = k.boost;
            entry.expanded = k.expanded;
            entry.excluded = k.excluded;
        }

        let mut qword = factory.spawn(&k.word);
        if !factory.setup(&mut qword) {
            self.warnings.warn(format!("keyword '{}' not found in dictionary", k.word));
        }

        let term = TermNode::new(qword, scope.clone(), registry_idx, k.atom_pos, k.dict_word.clone());
        let mut node: BoxNode = Box::new(term);

        if !scope.zone_ids.is_empty() && !scope.zonespan {
            if let Some(engine) = &self.zone_engine {
                let engine = Rc::clone(engine);
                let names: Vec<String> =
                    scope.zone_ids.iter().filter_map(|&id| self.zone_names.get(id as usize).cloned()).collect();
                let predicate: HitPredicate = Box::new(move |docid, hit| {
                    let mut engine = engine.borrow_mut();
                    names.iter().any(|name| engine.is_in_zone(name, docid, hit) == ZoneLookup::Found)
                });
                node = Box::new(FilterNode::new(node, predicate));
            }
        }

        node = match (k.field_start, k.field_end) {
            (true, true) => Box::new(FilterNode::new(node, field_start_end())),
            (true, false) => Box::new(FilterNode::new(node, field_start())),
            (false, true) => Box::new(FilterNode::new(node, field_end())),
            (false, false) => node,
        };

        if let Some(max_pos) = scope.max_field_pos {
            node = Box::new(FilterNode::new(node, field_limit(max_pos)));
        }

        if k.payload {
            node = Box::new(CacheProxyNode::new(node, CacheBudget { doc_bytes: 8 << 20, hit_bytes: 8 << 20 }));
        }

        node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ExecutionContext;
    use crate::hitpos::Hitpos;
    use crate::operators::ExtNode;
    use crate::qword::InMemoryQword;
    use crate::registry::QwordRegistry;

    struct FakeDictionary;

    impl QwordSetup for FakeDictionary {
        type W = InMemoryQword;

        fn spawn(&self, keyword: &str) -> InMemoryQword {
            match keyword {
                "fox" => InMemoryQword::new(vec![(1, 1, vec![hp(0)]), (2, 1, vec![hp(3)])], false),
                "dog" => InMemoryQword::new(vec![(1, 1, vec![hp(1)])], false),
                _ => InMemoryQword::new(vec![], false),
            }
        }

        fn setup(&self, qword: &mut InMemoryQword) -> bool {
            qword.docs_count() > 0
        }

        fn hitlist_is_inline(&self) -> bool {
            true
        }
    }

    fn hp(pos: u32) -> Hitpos {
        Hitpos::new(0, pos, false)
    }

    fn drain(node: &mut dyn ExtNode, ns: &crate::operators::NodeSetup<'_>) -> Vec<DocId> {
        let mut out = Vec::new();
        while let Some(chunk) = node.get_docs_chunk(ns) {
            out.extend(chunk.iter().filter(|d| !d.is_sentinel()).map(|d| d.docid));
        }
        out
    }

    #[test]
    fn and_of_two_keywords_intersects() {
        let mut registry = QwordRegistry::new();
        let warnings = WarningSink::new();
        let mut builder = QueryTreeBuilder::new(&mut registry, &warnings);
        let factory = FakeDictionary;
        let tree = QueryNode::And(vec![
            QueryNode::Keyword(Keyword::new("fox", 1)),
            QueryNode::Keyword(Keyword::new("dog", 2)),
        ]);
        let mut node = builder.build(&factory, &tree, &MatchScope::all_fields()).unwrap();
        let exec = ExecutionContext::unbounded();
        let ns = crate::operators::NodeSetup { exec: &exec, warnings: &warnings };
        assert_eq!(drain(node.as_mut(), &ns), vec![1]);
    }

    #[test]
    fn not_under_and_lowers_to_andnot() {
        let mut registry = QwordRegistry::new();
        let warnings = WarningSink::new();
        let mut builder = QueryTreeBuilder::new(&mut registry, &warnings);
        let factory = FakeDictionary;
        // fox AND NOT dog -> doc 2 only (fox matches {1,2}, dog matches {1}).
        let tree = QueryNode::And(vec![
            QueryNode::Keyword(Keyword::new("fox", 1)),
            QueryNode::Not(Box::new(QueryNode::Keyword(Keyword::new("dog", 2)))),
        ]);
        let mut node = builder.build(&factory, &tree, &MatchScope::all_fields()).unwrap();
        let exec = ExecutionContext::unbounded();
        let ns = crate::operators::NodeSetup { exec: &exec, warnings: &warnings };
        assert_eq!(drain(node.as_mut(), &ns), vec![2]);
    }

    #[test]
    fn bare_not_is_rejected() {
        let mut registry = QwordRegistry::new();
        let warnings = WarningSink::new();
        let mut builder = QueryTreeBuilder::new(&mut registry, &warnings);
        let factory = FakeDictionary;
        let tree = QueryNode::Not(Box::new(QueryNode::Keyword(Keyword::new("fox", 1))));
        let result = builder.build(&factory, &tree, &MatchScope::all_fields());
        assert!(result.is_err());
    }

    #[test]
    fn empty_and_is_rejected() {
        let mut registry = QwordRegistry::new();
        let warnings = WarningSink::new();
        let mut builder = QueryTreeBuilder::new(&mut registry, &warnings);
        let factory = FakeDictionary;
        let tree = QueryNode::And(vec![]);
        let result = builder.build(&factory, &tree, &MatchScope::all_fields());
        assert!(result.is_err());
    }
}
