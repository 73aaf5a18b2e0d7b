//! MVA and JSON group sorters (spec.md §4.6 "MVA group sorter" / "JSON
//! group sorter"): both fan a single match out to possibly many groups
//! before delegating the actual bucketing to the k-buffer [`GroupSorter`]
//! machinery in [`super::group`].

use crate::ranker::{DynamicValue, Match};
use crate::sorter::group::GroupSorter;
use crate::sorter::{Comparator, Sorter};

/// `GROUP BY mva_attr`: the grouping attribute is an MVA (uint32-set or
/// int64-set), stored on the match as `DynamicValue::IntVec`. The match is
/// pushed once per distinct member of the set, each time under a
/// synthetic per-value group key.
pub struct MvaGroupSorter {
    mva_attr: String,
    inner: GroupSorter,
}

const MVA_KEY_ATTR: &str = "@mva_key";

impl MvaGroupSorter {
    pub fn new(comparator: Comparator, mva_attr: impl Into<String>, distinct_attr: Option<String>, k: usize) -> Self {
        MvaGroupSorter {
            mva_attr: mva_attr.into(),
            inner: GroupSorter::new(comparator, MVA_KEY_ATTR, distinct_attr, k),
        }
    }
}

impl Sorter for MvaGroupSorter {
    fn push(&mut self, m: Match) -> bool {
        let values = match m.dynamic.get(&self.mva_attr) {
            Some(DynamicValue::IntVec(v)) => v.clone(),
            _ => return false,
        };
        let mut pushed = false;
        for v in values {
            let mut fanned = m.clone();
            fanned.set_dynamic(MVA_KEY_ATTR, DynamicValue::Int(v));
            pushed |= self.inner.push(fanned);
        }
        pushed
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        self.inner.flatten(out, having)
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        self.inner.finalize(visit);
    }

    fn get_length(&self) -> i32 {
        self.inner.get_length()
    }

    fn is_groupby(&self) -> bool {
        true
    }
}

/// `GROUP BY json_attr`: dispatches on the JSON node's runtime type and
/// computes an FNV-64 hash of its canonical textual form as the group
/// key, since JSON values have no single natural integer identity the
/// way scalar attributes do.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonNode {
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<JsonNode>),
}

fn json_hash(node: &JsonNode) -> i64 {
    let text = match node {
        JsonNode::Int(v) => v.to_string(),
        JsonNode::Float(v) => v.to_string(),
        JsonNode::Str(s) => s.clone(),
        JsonNode::Array(items) => items.iter().map(json_hash).map(|h| h.to_string()).collect::<Vec<_>>().join(","),
    };
    crate::constants::fnv1a64(text.as_bytes()) as i64
}

pub struct JsonGroupSorter {
    json_attr: String,
    inner: GroupSorter,
}

const JSON_KEY_ATTR: &str = "@json_key";

impl JsonGroupSorter {
    pub fn new(comparator: Comparator, json_attr: impl Into<String>, k: usize) -> Self {
        JsonGroupSorter { json_attr: json_attr.into(), inner: GroupSorter::new(comparator, JSON_KEY_ATTR, None, k) }
    }

    /// Pushes `m` using `node` (read by the caller from the JSON pool) as
    /// the grouping value; the core never parses JSON itself.
    pub fn push_json(&mut self, mut m: Match, node: &JsonNode) -> bool {
        m.set_dynamic(JSON_KEY_ATTR, DynamicValue::Int(json_hash(node)));
        let _ = &self.json_attr;
        self.inner.push(m)
    }
}

impl Sorter for JsonGroupSorter {
    fn push(&mut self, _m: Match) -> bool {
        // JSON group keys require the out-of-band node via `push_json`;
        // a plain push has no value to hash.
        false
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        self.inner.flatten(out, having)
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        self.inner.finalize(visit);
    }

    fn get_length(&self) -> i32 {
        self.inner.get_length()
    }

    fn is_groupby(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::KeypartSpec;

    fn m(docid: u32, weight: i64) -> Match {
        Match { weight, ..Match::new(docid) }
    }

    #[test]
    fn mva_group_sorter_fans_out_per_member() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = MvaGroupSorter::new(cmp, "tags", None, 10);
        let mut doc = m(1, 10);
        doc.set_dynamic("tags", DynamicValue::IntVec(vec![1, 2, 3]));
        s.push(doc);
        let mut out = Vec::new();
        let count = s.flatten(&mut out, None);
        assert_eq!(count, 3);
    }

    #[test]
    fn json_group_sorter_groups_by_node_hash() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = JsonGroupSorter::new(cmp, "attrs.category", 10);
        s.push_json(m(1, 10), &JsonNode::Str("electronics".into()));
        s.push_json(m(2, 20), &JsonNode::Str("electronics".into()));
        s.push_json(m(3, 5), &JsonNode::Str("books".into()));
        let mut out = Vec::new();
        let count = s.flatten(&mut out, None);
        assert_eq!(count, 2);
    }
}
