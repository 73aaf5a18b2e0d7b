//! The `expr` ranker and the external expression engine contract it talks
//! to (spec.md §4.5, last two paragraphs; §6 "Inbound: expression
//! engine"). Expression parsing itself lives outside this crate: the core
//! only ever evaluates factors through whatever [`ExpressionEvaluator`] the
//! embedder hands in, and supplies the identifier-resolving
//! [`ExpressionHook`] side of that contract.

use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::ranker::factors::Factors;
use crate::ranker::{FieldLens, Match, RankerState};

/// A factor or attribute identifier the expression hook can resolve for
/// the evaluator (spec.md §4.5 "resolves identifiers like `lcs`, `bm25`,
/// `exact_hit`, etc.").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorKind {
    Lcs,
    WordCount,
    HitCount,
    MinHitPos,
    MinBestSpanPos,
    MaxWindowHits,
    MinGaps,
    Lccs,
    Wlccs,
    Atc,
    Bm25,
    Bm25a,
    ExactHitMask,
    ExactOrderMask,
    MatchedFieldsMask,
    DocWordCount,
}

/// Whether an identifier names a per-field factor (only legal inside
/// `sum(...)`/`top(...)`, spec.md §4.5 last paragraph) or a per-document
/// scalar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactorArity {
    PerField,
    PerDocument,
}

impl FactorKind {
    pub fn arity(self) -> FactorArity {
        use FactorKind::*;
        match self {
            Lcs | WordCount | HitCount | MinHitPos | MinBestSpanPos | MaxWindowHits | MinGaps | Lccs | Wlccs | Atc => {
                FactorArity::PerField
            }
            Bm25 | Bm25a | ExactHitMask | ExactOrderMask | MatchedFieldsMask | DocWordCount => {
                FactorArity::PerDocument
            }
        }
    }
}

/// The identifier-resolution half of the expression-engine contract
/// (spec.md §6): given a name, tells the external parser what kind of
/// node to build, and enforces the field-aggregation-context rule.
pub trait ExpressionHook {
    fn resolve(&self, identifier: &str) -> Option<FactorKind>;

    /// Returns `Err` (rejected at parse time) if `kind` has
    /// [`FactorArity::PerField`] but isn't wrapped in a field-aggregation
    /// call.
    fn check_context(&self, kind: FactorKind, inside_field_aggregate: bool) -> Result<(), String> {
        if kind.arity() == FactorArity::PerField && !inside_field_aggregate {
            return Err(format!("{kind:?} is a per-field factor and must appear inside sum(...)/top(...)"));
        }
        Ok(())
    }
}

/// The evaluator an external expression engine hands back after parsing
/// (spec.md §6). `per_field` receives one value per matched field,
/// `field_weight` so `sum(lcs * field_weight)`-style expressions can
/// fold without the evaluator needing schema access of its own.
pub trait ExpressionEvaluator {
    fn eval(&self, factors: &Factors, field_weight: &[f32]) -> f64;
}

/// Reference evaluator used by tests and by embedders that have not yet
/// wired a real expression parser: evaluates `sum(lcs * field_weight) +
/// bm25` directly, matching the worked example of spec.md §8 scenario 6.
pub struct LcsWeightedSumPlusBm25;

impl ExpressionEvaluator for LcsWeightedSumPlusBm25 {
    fn eval(&self, factors: &Factors, field_weight: &[f32]) -> f64 {
        let sum: f64 = factors
            .lcs
            .iter()
            .enumerate()
            .map(|(field, &lcs)| lcs as f64 * field_weight.get(field).copied().unwrap_or(1.0) as f64)
            .sum();
        sum + factors.bm25 as f64
    }
}

/// Computes the same ~20 factors as the built-in rankers, then evaluates
/// a user expression over them (spec.md §4.4 "expr").
pub struct ExprState<E: ExpressionEvaluator> {
    factors: Factors,
    field_weight: Vec<f32>,
    evaluator: E,
    bm25_scale: f32,
}

impl<E: ExpressionEvaluator> ExprState<E> {
    pub fn new(field_weight: Vec<f32>, evaluator: E) -> Self {
        ExprState { factors: Factors::default(), field_weight, evaluator, bm25_scale: 1000.0 }
    }
}

impl<E: ExpressionEvaluator> RankerState for ExprState<E> {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.factors.update(hit, 1.0);
        self.factors.bm25 += hit.weight as f32 / self.bm25_scale;
    }

    fn finalize(&mut self, match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let value = self.evaluator.eval(&self.factors, &self.field_weight);
        match_.set_dynamic("@expr", crate::ranker::DynamicValue::Float(value));
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitpos::Hitpos;

    #[test]
    fn hook_rejects_per_field_factor_outside_aggregation() {
        struct Hook;
        impl ExpressionHook for Hook {
            fn resolve(&self, identifier: &str) -> Option<FactorKind> {
                match identifier {
                    "lcs" => Some(FactorKind::Lcs),
                    "bm25" => Some(FactorKind::Bm25),
                    _ => None,
                }
            }
        }
        let hook = Hook;
        assert!(hook.check_context(FactorKind::Lcs, false).is_err());
        assert!(hook.check_context(FactorKind::Lcs, true).is_ok());
        assert!(hook.check_context(FactorKind::Bm25, false).is_ok());
    }

    #[test]
    fn expr_state_stashes_expr_on_the_match() {
        let mut s = ExprState::new(vec![1.0], LcsWeightedSumPlusBm25);
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&ExtHit::single(1, Hitpos::new(0, 0, false), 1), &[]);
        s.finalize(&mut m, lens);
        assert!(m.dynamic.contains_key("@expr"));
    }
}
