//! The `export` ranker variant (spec.md §4.4): computes the same factors
//! as `expr`, but emits them as a string blob per document instead of (or
//! in addition to) using them purely for ordering.

use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::ranker::expr::ExpressionEvaluator;
use crate::ranker::factors::Factors;
use crate::ranker::{DynamicValue, FieldLens, Match, RankerState};

/// Serializes a document's [`Factors`] into the blob format the embedder
/// stores alongside the match (e.g. to power a later re-rank step without
/// recomputing factors). The format itself is embedder-defined; the core
/// only guarantees it is produced from the same factor set `expr` uses.
pub trait FactorExporter {
    fn export(&self, factors: &Factors) -> String;
}

/// `key1=val1;key2=val2;...` exporter used by tests and as a sane default.
pub struct KeyValueExporter;

impl FactorExporter for KeyValueExporter {
    fn export(&self, factors: &Factors) -> String {
        let lcs_sum: u32 = factors.lcs.iter().map(|&v| v as u32).sum();
        format!(
            "lcs={};bm25={:.4};hits={};words={}",
            lcs_sum, factors.bm25, factors.matched_fields_mask.count_ones(), factors.doc_word_count
        )
    }
}

pub struct ExportState<E: ExpressionEvaluator, X: FactorExporter> {
    factors: Factors,
    field_weight: Vec<f32>,
    evaluator: E,
    exporter: X,
}

impl<E: ExpressionEvaluator, X: FactorExporter> ExportState<E, X> {
    pub fn new(field_weight: Vec<f32>, evaluator: E, exporter: X) -> Self {
        ExportState { factors: Factors::default(), field_weight, evaluator, exporter }
    }
}

impl<E: ExpressionEvaluator, X: FactorExporter> RankerState for ExportState<E, X> {
    fn start_doc(&mut self, _docid: DocId) {
        self.factors.reset();
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.factors.update(hit, 1.0);
    }

    fn finalize(&mut self, match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        let value = self.evaluator.eval(&self.factors, &self.field_weight);
        let blob = self.exporter.export(&self.factors);
        match_.set_dynamic("@expr", DynamicValue::Float(value));
        match_.set_dynamic("@factors", DynamicValue::Str(blob));
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitpos::Hitpos;
    use crate::ranker::expr::LcsWeightedSumPlusBm25;

    #[test]
    fn export_state_stashes_both_expr_and_blob() {
        let mut s = ExportState::new(vec![1.0], LcsWeightedSumPlusBm25, KeyValueExporter);
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&ExtHit::single(1, Hitpos::new(0, 0, false), 1), &[]);
        s.finalize(&mut m, lens);
        assert!(m.dynamic.contains_key("@expr"));
        match m.dynamic.get("@factors") {
            Some(DynamicValue::Str(blob)) => assert!(blob.contains("lcs=")),
            other => panic!("expected a string blob, got {other:?}"),
        }
    }
}
