//! Group sorters (spec.md §4.6 "Group sorter (k-buffer)" and "Group
//! sorter N-best"): both hash an integer group key off a dynamic column
//! and fold matches into a `GroupAggregate` (`@count`, `@distinct`,
//! `@groupbystr`) rather than keeping every raw match.
//!
//! Grounded on `crates/milli/src/search/new/distinct.rs`'s
//! hash-then-keep-best-representative shape; `GROUP_FACTOR` slack and the
//! cut-worst-half-when-full behavior mirror the K-buffer sorter's own
//! `4·K` slack idea applied one level up, to groups instead of matches.

use std::collections::HashMap;

use crate::ranker::{DynamicValue, Match};
use crate::sorter::{Comparator, GroupAggregate, Sorter};

/// Slack multiplier on the number of live groups before a cut runs.
const GROUP_FACTOR: usize = 4;

fn group_key(m: &Match, group_attr: &str) -> i64 {
    match m.dynamic.get(group_attr) {
        Some(DynamicValue::Int(v)) => *v,
        Some(DynamicValue::Float(v)) => *v as i64,
        Some(DynamicValue::Str(s)) => crate::constants::fnv1a64(s.as_bytes()) as i64,
        _ => 0,
    }
}

/// The group key's original string form, when the grouping attribute is
/// string-typed; `None` for numeric group keys, which are already
/// self-describing.
fn group_key_str<'a>(m: &'a Match, group_attr: &str) -> Option<&'a str> {
    match m.dynamic.get(group_attr) {
        Some(DynamicValue::Str(s)) => Some(s.as_str()),
        _ => None,
    }
}

struct GroupEntry {
    representative: Match,
    agg: GroupAggregate,
}

/// Group sorter (k-buffer): one representative match per group key, plus
/// its aggregate. When the live group count reaches `k * GROUP_FACTOR`,
/// the worst `k * GROUP_FACTOR / 2` groups (by comparator order of their
/// representative) are evicted.
pub struct GroupSorter {
    comparator: Comparator,
    group_attr: String,
    distinct_attr: Option<String>,
    k: usize,
    groups: HashMap<i64, GroupEntry>,
}

impl GroupSorter {
    pub fn new(comparator: Comparator, group_attr: impl Into<String>, distinct_attr: Option<String>, k: usize) -> Self {
        GroupSorter { comparator, group_attr: group_attr.into(), distinct_attr, k, groups: HashMap::new() }
    }

    fn distinct_value(&self, m: &Match) -> Option<i64> {
        let name = self.distinct_attr.as_ref()?;
        match m.dynamic.get(name) {
            Some(DynamicValue::Int(v)) => Some(*v),
            Some(DynamicValue::Float(v)) => Some(*v as i64),
            Some(DynamicValue::Str(s)) => Some(crate::constants::fnv1a64(s.as_bytes()) as i64),
            _ => None,
        }
    }

    fn cut_worst_half(&mut self) {
        let mut keys: Vec<i64> = self.groups.keys().copied().collect();
        let comparator = &self.comparator;
        keys.sort_by(|a, b| comparator.compare(&self.groups[a].representative, &self.groups[b].representative));
        let drop_from = self.k * GROUP_FACTOR / 2;
        for key in keys.into_iter().skip(drop_from) {
            self.groups.remove(&key);
        }
    }
}

impl Sorter for GroupSorter {
    fn push(&mut self, m: Match) -> bool {
        let key = group_key(&m, &self.group_attr);
        let distinct_value = self.distinct_value(&m);
        let groupbystr = group_key_str(&m, &self.group_attr);
        match self.groups.get_mut(&key) {
            Some(entry) => {
                entry.agg.merge_one_with_groupbystr(distinct_value, groupbystr);
                if self.comparator.compare(&m, &entry.representative) == std::cmp::Ordering::Less {
                    entry.representative = m;
                }
            }
            None => {
                let mut agg = GroupAggregate::default();
                agg.merge_one_with_groupbystr(distinct_value, groupbystr);
                self.groups.insert(key, GroupEntry { representative: m, agg });
            }
        }
        if self.groups.len() >= self.k * GROUP_FACTOR {
            self.cut_worst_half();
        }
        true
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        let mut rows: Vec<Match> = self
            .groups
            .drain()
            .map(|(_, entry)| {
                let mut m = entry.representative;
                m.set_dynamic("@count", DynamicValue::Int(entry.agg.count as i64));
                m.set_dynamic("@distinct", DynamicValue::Int(entry.agg.distinct_count() as i64));
                if let Some(s) = entry.agg.groupbystr {
                    m.set_dynamic("@groupbystr", DynamicValue::Str(s));
                }
                m
            })
            .collect();
        rows.sort_by(|a, b| self.comparator.compare(a, b));
        rows.truncate(self.k);
        let mut count = 0;
        for m in rows {
            if having.map(|f| f(&m)).unwrap_or(true) {
                out.push(m);
                count += 1;
            }
        }
        count
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        for entry in self.groups.values() {
            visit(&entry.representative);
        }
    }

    fn get_length(&self) -> i32 {
        self.groups.len().min(self.k) as i32
    }

    fn is_groupby(&self) -> bool {
        true
    }
}

/// Group sorter N-best: keeps up to `g` best matches per group instead of
/// one representative. The per-group chain is modeled directly as a
/// `Vec<Match>` per key rather than the backing-array linked list the
/// original engine used, since that indirection exists purely to avoid a
/// second allocation per group and buys nothing once matches are owned.
pub struct GroupNBestSorter {
    comparator: Comparator,
    group_attr: String,
    g: usize,
    k: usize,
    groups: HashMap<i64, Vec<Match>>,
}

impl GroupNBestSorter {
    pub fn new(comparator: Comparator, group_attr: impl Into<String>, g: usize, k: usize) -> Self {
        GroupNBestSorter { comparator, group_attr: group_attr.into(), g, k, groups: HashMap::new() }
    }
}

impl Sorter for GroupNBestSorter {
    fn push(&mut self, m: Match) -> bool {
        let key = group_key(&m, &self.group_attr);
        let chain = self.groups.entry(key).or_default();
        chain.push(m);
        chain.sort_by(|a, b| self.comparator.compare(a, b));
        chain.truncate(self.g);
        true
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        let mut rows: Vec<Match> = self.groups.drain().flat_map(|(_, chain)| chain).collect();
        rows.sort_by(|a, b| self.comparator.compare(a, b));
        rows.truncate(self.k);
        let mut count = 0;
        for m in rows {
            if having.map(|f| f(&m)).unwrap_or(true) {
                out.push(m);
                count += 1;
            }
        }
        count
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        for chain in self.groups.values() {
            for m in chain {
                visit(m);
            }
        }
    }

    fn get_length(&self) -> i32 {
        self.groups.values().map(|c| c.len()).sum::<usize>().min(self.k) as i32
    }

    fn is_groupby(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::KeypartSpec;

    fn m(docid: u32, weight: i64, cat: i64) -> Match {
        let mut m = Match { weight, ..Match::new(docid) };
        m.set_dynamic("cat", DynamicValue::Int(cat));
        m
    }

    #[test]
    fn groups_by_attribute_and_counts_members() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = GroupSorter::new(cmp, "cat", None, 10);
        for (docid, weight, cat) in
            [(1, 10, 0), (2, 20, 0), (3, 5, 1), (4, 50, 1), (5, 1, 1)]
        {
            s.push(m(docid, weight, cat));
        }
        let mut out = Vec::new();
        s.flatten(&mut out, None);
        assert_eq!(out.len(), 2);
        let group0 = out.iter().find(|m| m.docid == 2).unwrap();
        assert_eq!(group0.dynamic.get("@count"), Some(&DynamicValue::Int(2)));
        let group1 = out.iter().find(|m| m.docid == 4).unwrap();
        assert_eq!(group1.dynamic.get("@count"), Some(&DynamicValue::Int(3)));
    }

    #[test]
    fn groupbystr_carries_original_string_for_string_keyed_groups() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = GroupSorter::new(cmp, "color", None, 10);
        for (docid, weight, color) in [(1, 10, "red"), (2, 20, "red"), (3, 5, "blue")] {
            let mut row = Match { weight, ..Match::new(docid) };
            row.set_dynamic("color", DynamicValue::Str(color.to_string()));
            s.push(row);
        }
        let mut out = Vec::new();
        s.flatten(&mut out, None);
        assert_eq!(out.len(), 2);
        let red = out.iter().find(|m| m.docid == 2).unwrap();
        assert_eq!(red.dynamic.get("@groupbystr"), Some(&DynamicValue::Str("red".to_string())));
        let blue = out.iter().find(|m| m.docid == 3).unwrap();
        assert_eq!(blue.dynamic.get("@groupbystr"), Some(&DynamicValue::Str("blue".to_string())));
    }

    #[test]
    fn nbest_keeps_top_g_per_group() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = GroupNBestSorter::new(cmp, "cat", 2, 10);
        for (docid, weight, cat) in [(1, 10, 0), (2, 20, 0), (3, 30, 0), (4, 5, 1)] {
            s.push(m(docid, weight, cat));
        }
        let mut out = Vec::new();
        s.flatten(&mut out, None);
        let group0_docids: Vec<u32> = out.iter().filter(|m| m.dynamic["cat"] == DynamicValue::Int(0)).map(|m| m.docid).collect();
        assert_eq!(group0_docids, vec![3, 2]);
    }
}
