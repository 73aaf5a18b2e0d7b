//! Implicit group sorter (spec.md §4.6 "Implicit group sorter"): a query
//! with aggregate select columns but no `GROUP BY` still produces exactly
//! one output row, the whole result set folded into a single implicit
//! group.

use crate::ranker::{DynamicValue, Match};
use crate::sorter::aggregate::{Aggregate, NumericAggregator};
use crate::sorter::Sorter;

#[derive(Debug, Clone)]
pub struct AggSpec {
    pub name: String,
    pub kind: Aggregate,
}

pub struct ImplicitSorter {
    specs: Vec<AggSpec>,
    aggs: Vec<NumericAggregator>,
    representative: Option<Match>,
}

impl ImplicitSorter {
    pub fn new(specs: Vec<AggSpec>) -> Self {
        let aggs = specs.iter().map(|s| NumericAggregator::new(s.kind)).collect();
        ImplicitSorter { specs, aggs, representative: None }
    }

    fn attr_as_f64(m: &Match, name: &str) -> Option<f64> {
        match m.dynamic.get(name) {
            Some(DynamicValue::Int(v)) => Some(*v as f64),
            Some(DynamicValue::Float(v)) => Some(*v),
            _ => None,
        }
    }
}

impl Sorter for ImplicitSorter {
    fn push(&mut self, m: Match) -> bool {
        for (spec, agg) in self.specs.iter().zip(self.aggs.iter_mut()) {
            if let Some(v) = Self::attr_as_f64(&m, &spec.name) {
                agg.add(v);
            }
        }
        if self.representative.is_none() {
            self.representative = Some(m);
        }
        true
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        let Some(mut m) = self.representative.take() else {
            return 0;
        };
        for (spec, agg) in self.specs.iter().zip(self.aggs.iter()) {
            m.set_dynamic(spec.name.clone(), DynamicValue::Float(agg.finalize()));
        }
        if having.map(|f| f(&m)).unwrap_or(true) {
            out.push(m);
            1
        } else {
            0
        }
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        if let Some(m) = &self.representative {
            visit(m);
        }
    }

    fn get_length(&self) -> i32 {
        if self.representative.is_some() {
            1
        } else {
            0
        }
    }
}
