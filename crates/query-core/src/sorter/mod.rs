//! L4 sorter family and L5 glue (spec.md §4.6, §4.7).
//!
//! Grounded on `meilisearch-core/src/criterion/mod.rs`'s criterion chain
//! (`Vec<Box<dyn Criterion>>` evaluated in order until a tie breaks) for
//! the up-to-[`crate::constants::MAX_SORT_FIELDS`]-keypart [`Comparator`];
//! matches reuse [`crate::ranker::Match`] directly since the sorter is
//! simply the next stage the ranker's output flows into, not a distinct
//! record type.

pub mod aggregate;
pub mod factory;
pub mod group;
pub mod heap;
pub mod implicit;
pub mod kbuffer;
pub mod mva_json_group;
pub mod queues;

use std::cmp::Ordering;

use crate::error::{Error, Result, UserError};
use crate::ranker::{DynamicValue, Match};
use crate::schema::{AttrLocator, Schema};

/// One of the comparable keyparts of spec.md §4.6 ("Comparator:
/// parameterized by an ordered list of up to 5 `(keypart, locator,
/// desc-bit)` triples").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keypart {
    Id,
    Weight,
    Int,
    Float,
    String,
    StringPtr,
}

/// String collation, pluggable per spec.md §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collation {
    LibcCaseInsensitive,
    LibcCaseSensitive,
    Utf8GeneralCi,
    Binary,
}

impl Collation {
    fn compare(self, a: &str, b: &str) -> Ordering {
        match self {
            Collation::Binary | Collation::LibcCaseSensitive => a.cmp(b),
            Collation::LibcCaseInsensitive | Collation::Utf8GeneralCi => {
                a.to_lowercase().cmp(&b.to_lowercase())
            }
        }
    }
}

/// One ordered sort key: which keypart, where to read it from, sort
/// direction, and (for string keyparts) collation.
#[derive(Debug, Clone)]
pub struct KeypartSpec {
    pub keypart: Keypart,
    /// `None` for `Id`/`Weight`, which read off the match directly rather
    /// than through a dynamic-attribute locator.
    pub locator: Option<AttrLocator>,
    pub dynamic_name: Option<String>,
    pub desc: bool,
    pub collation: Collation,
}

impl KeypartSpec {
    pub fn id(desc: bool) -> Self {
        KeypartSpec { keypart: Keypart::Id, locator: None, dynamic_name: None, desc, collation: Collation::Binary }
    }

    pub fn weight(desc: bool) -> Self {
        KeypartSpec {
            keypart: Keypart::Weight,
            locator: None,
            dynamic_name: None,
            desc,
            collation: Collation::Binary,
        }
    }

    pub fn dynamic(keypart: Keypart, name: impl Into<String>, desc: bool, collation: Collation) -> Self {
        KeypartSpec { keypart, locator: None, dynamic_name: Some(name.into()), desc, collation }
    }
}

/// Up to [`crate::constants::MAX_SORT_FIELDS`] ordered keyparts, with an
/// implicit final "id ASC" tie-break (spec.md §4.6 "Tie-breaker").
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    keyparts: Vec<KeypartSpec>,
}

impl Comparator {
    pub fn new(keyparts: Vec<KeypartSpec>) -> Result<Self> {
        if keyparts.len() > crate::constants::MAX_SORT_FIELDS {
            return Err(Error::User(UserError::TooManySortFields {
                count: keyparts.len(),
                max: crate::constants::MAX_SORT_FIELDS,
            }));
        }
        Ok(Comparator { keyparts })
    }

    fn dynamic_value<'a>(m: &'a Match, name: &str) -> Option<&'a DynamicValue> {
        m.dynamic.get(name)
    }

    fn compare_one(&self, spec: &KeypartSpec, a: &Match, b: &Match) -> Ordering {
        let ord = match spec.keypart {
            Keypart::Id => a.docid.cmp(&b.docid),
            Keypart::Weight => a.weight.cmp(&b.weight),
            Keypart::Int => {
                let name = spec.dynamic_name.as_deref().unwrap_or_default();
                let av = Self::dynamic_value(a, name);
                let bv = Self::dynamic_value(b, name);
                match (av, bv) {
                    (Some(DynamicValue::Int(x)), Some(DynamicValue::Int(y))) => x.cmp(y),
                    _ => Ordering::Equal,
                }
            }
            Keypart::Float => {
                let name = spec.dynamic_name.as_deref().unwrap_or_default();
                let av = Self::dynamic_value(a, name);
                let bv = Self::dynamic_value(b, name);
                match (av, bv) {
                    (Some(DynamicValue::Float(x)), Some(DynamicValue::Float(y))) => {
                        x.partial_cmp(y).unwrap_or(Ordering::Equal)
                    }
                    _ => Ordering::Equal,
                }
            }
            Keypart::String | Keypart::StringPtr => {
                let name = spec.dynamic_name.as_deref().unwrap_or_default();
                let av = Self::dynamic_value(a, name);
                let bv = Self::dynamic_value(b, name);
                match (av, bv) {
                    (Some(DynamicValue::Str(x)), Some(DynamicValue::Str(y))) => spec.collation.compare(x, y),
                    _ => Ordering::Equal,
                }
            }
        };
        if spec.desc {
            ord.reverse()
        } else {
            ord
        }
    }

    /// Full comparison, falling through ties to the next keypart and
    /// finally to the implicit "id ASC" tie-break.
    pub fn compare(&self, a: &Match, b: &Match) -> Ordering {
        for spec in &self.keyparts {
            let ord = self.compare_one(spec, a, b);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.docid.cmp(&b.docid)
    }
}

/// Group-key accumulation state (`@count`, `@distinct`, `@groupbystr`),
/// shared by every grouping sorter variant (spec.md §4.6 "Group sorter").
#[derive(Debug, Clone, Default)]
pub struct GroupAggregate {
    pub count: u64,
    pub distinct: std::collections::HashSet<i64>,
    pub groupbystr: Option<String>,
}

impl GroupAggregate {
    pub fn merge_one(&mut self, distinct_value: Option<i64>) {
        self.count += 1;
        if let Some(v) = distinct_value {
            self.distinct.insert(v);
        }
    }

    /// Like [`Self::merge_one`], but also records the group key's original
    /// string form the first time it's seen, for groupings keyed on a
    /// string attribute where the hashed `i64` key isn't itself displayable.
    pub fn merge_one_with_groupbystr(&mut self, distinct_value: Option<i64>, groupbystr: Option<&str>) {
        self.merge_one(distinct_value);
        if self.groupbystr.is_none() {
            self.groupbystr = groupbystr.map(str::to_string);
        }
    }

    pub fn distinct_count(&self) -> u64 {
        self.distinct.len() as u64
    }
}

/// Shared sink contract every L4 variant implements (spec.md §4.6).
pub trait Sorter {
    /// Returns `false` if rejected as a duplicate (same docid already
    /// present and not more relevant).
    fn push(&mut self, m: Match) -> bool;

    /// Grouped push: `new_set` signals the match starts a fresh group
    /// bucket rather than merging into the current group accumulator
    /// (used by cross-shard `SUM + MERGE`, spec.md §8 property 13).
    fn push_grouped(&mut self, m: Match, new_set: bool) -> bool {
        self.push(m)
    }

    /// Drains in comparator order into `out`, applying the optional
    /// HAVING filter named by `tag` (empty string = no filter). Returns
    /// the number of rows written.
    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize;

    fn finalize(&self, visit: &mut dyn FnMut(&Match));

    fn get_length(&self) -> i32;

    fn uses_attrs(&self) -> bool {
        false
    }

    fn is_groupby(&self) -> bool {
        false
    }

    fn can_multi(&self) -> bool {
        false
    }

    fn set_schema(&mut self, _schema: Schema) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(docid: u32, weight: i64) -> Match {
        Match { weight, ..Match::new(docid) }
    }

    #[test]
    fn comparator_falls_through_to_id_tiebreak() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let a = m(1, 5);
        let b = m(2, 5);
        assert_eq!(cmp.compare(&a, &b), Ordering::Less);
    }

    #[test]
    fn comparator_rejects_too_many_keyparts() {
        let specs = (0..10).map(|_| KeypartSpec::id(false)).collect();
        assert!(Comparator::new(specs).is_err());
    }

    #[test]
    fn weight_desc_orders_higher_weight_first() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let hi = m(1, 100);
        let lo = m(2, 1);
        assert_eq!(cmp.compare(&hi, &lo), Ordering::Less);
    }
}
