//! L5 sorter factory (spec.md §4.7): turns a sort clause plus grouping
//! flags into a concrete boxed [`Sorter`], the way
//! `crates/milli/src/search/new/sort.rs` turns a parsed `sort` criteria
//! list into a ranking-rule chain. The "~40 combinations, dispatched via
//! a small selector code" of spec.md step 5 is modeled here as one
//! `match` over a small selector struct rather than the template
//! specialization the original engine used, per REDESIGN FLAGS.

use crate::constants::AttrTypeCode;
use crate::error::{Error, Result, UserError};
use crate::schema::{AttrDef, Schema};
use crate::sorter::group::{GroupNBestSorter, GroupSorter};
use crate::sorter::heap::HeapSorter;
use crate::sorter::implicit::{AggSpec, ImplicitSorter};
use crate::sorter::kbuffer::KBufferSorter;
use crate::sorter::mva_json_group::{JsonGroupSorter, MvaGroupSorter};
use crate::sorter::{Collation, Comparator, Keypart, KeypartSpec, Sorter};

/// One token of a textual sort clause, already split on commas and
/// whitespace by the caller; `desc` captures a trailing `DESC`/`-`.
pub struct SortToken<'a> {
    pub name: &'a str,
    pub desc: bool,
}

/// Recognizes the synonyms spec.md §4.7 step 2 names
/// (`@relevance`/`@rank`/`@weight`/`weight()`, `@id`/`id`, `@group`,
/// `count(*)`, `facet()`, `groupby()`) plus plain attribute names resolved
/// against `schema`. Rejects MVA attributes as sort keys.
pub fn resolve_sort_token(token: &SortToken<'_>, schema: &Schema) -> Result<KeypartSpec> {
    let lower = token.name.trim().to_ascii_lowercase();
    match lower.as_str() {
        "@relevance" | "@rank" | "@weight" | "weight()" => Ok(KeypartSpec::weight(token.desc)),
        "@id" | "id" => Ok(KeypartSpec::id(token.desc)),
        "@group" | "groupby()" => {
            Ok(KeypartSpec::dynamic(Keypart::Int, "@groupby", token.desc, Collation::Binary))
        }
        "count(*)" | "@count" => Ok(KeypartSpec::dynamic(Keypart::Int, "@count", token.desc, Collation::Binary)),
        "facet()" | "@distinct" => {
            Ok(KeypartSpec::dynamic(Keypart::Int, "@distinct", token.desc, Collation::Binary))
        }
        _ => resolve_attr_keypart(token, schema),
    }
}

fn resolve_attr_keypart(token: &SortToken<'_>, schema: &Schema) -> Result<KeypartSpec> {
    let (_, attr) = schema
        .find(token.name)
        .ok_or_else(|| Error::User(UserError::UnknownSortAttribute { name: token.name.to_string() }))?;
    if attr.attr_type.is_mva() {
        return Err(Error::User(UserError::MvaInOrderBy { name: token.name.to_string() }));
    }
    Ok(keypart_for_attr(attr, token.desc))
}

fn keypart_for_attr(attr: &AttrDef, desc: bool) -> KeypartSpec {
    use crate::constants::AttrTypeCode::*;
    let keypart = match attr.attr_type {
        Integer | Timestamp | Bool | BigInt | TokenCount => Keypart::Int,
        Float => Keypart::Float,
        String => Keypart::String,
        StringPtr => Keypart::StringPtr,
        _ => Keypart::Int,
    };
    KeypartSpec::dynamic(keypart, attr.name.clone(), desc, Collation::Utf8GeneralCi)
}

/// spec.md §4.7 step 1: which dynamic columns the sorter schema needs
/// layered on top of the index schema.
#[derive(Debug, Clone, Default)]
pub struct SorterSchemaPlan {
    /// `(name, type)` per `dItems` select expression.
    pub select_exprs: Vec<(String, AttrTypeCode)>,
    pub geodist: bool,
    pub expr: bool,
    pub grouping: bool,
}

/// Builds the sorter schema: the index schema plus dynamic columns for
/// select expressions, `@geodist`, `@expr`, and (if grouping) `@groupby`/
/// `@count`/`@distinct`/`@groupbystr` (spec.md §4.7 step 1).
pub fn build_sorter_schema(base: &Schema, plan: &SorterSchemaPlan) -> Schema {
    let mut schema = base.clone();
    let mut next_bit = base.iter().map(|a| a.locator.bit_offset + a.locator.bit_count).max().unwrap_or(0);
    let add = |schema: &mut Schema, name: &str, ty: AttrTypeCode, next_bit: &mut u32| {
        *schema = schema.with_dynamic_attr(name, ty, *next_bit, 32);
        *next_bit += 32;
    };
    for (name, ty) in &plan.select_exprs {
        add(&mut schema, name, *ty, &mut next_bit);
    }
    if plan.geodist {
        add(&mut schema, "@geodist", AttrTypeCode::Float, &mut next_bit);
    }
    if plan.expr {
        add(&mut schema, "@expr", AttrTypeCode::Float, &mut next_bit);
    }
    if plan.grouping {
        for name in ["@groupby", "@count", "@distinct"] {
            add(&mut schema, name, AttrTypeCode::Integer, &mut next_bit);
        }
        add(&mut schema, "@groupbystr", AttrTypeCode::String, &mut next_bit);
    }
    schema
}

/// The stages an expression can be evaluated at, earliest first (spec.md
/// §4.7 step 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Prefilter,
    Presort,
    Sorter,
    Final,
    Postlimit,
}

/// Promotes an expression to the earliest stage any of its referencing
/// sites (filter, sort, select, …) requires it evaluated by, then pushes
/// that stage later if any dependency isn't ready until later, since a
/// dependent can never run before its dependency (spec.md §4.7 step 4,
/// "propagate dependency stages transitively").
pub fn earliest_viable_stage(referenced_by: &[Stage], depends_on_stage: &[Stage]) -> Stage {
    let wanted_by_earliest_referencer = referenced_by.iter().min().copied().unwrap_or(Stage::Sorter);
    let blocked_until = depends_on_stage.iter().max().copied().unwrap_or(Stage::Prefilter);
    wanted_by_earliest_referencer.max(blocked_until)
}

/// Parses a full sort clause (already tokenized) into a [`Comparator`].
pub fn build_comparator(tokens: &[SortToken<'_>], schema: &Schema) -> Result<Comparator> {
    let keyparts = tokens.iter().map(|t| resolve_sort_token(t, schema)).collect::<Result<Vec<_>>>()?;
    Comparator::new(keyparts)
}

/// The `(match-func, group-func, distinct?, mva?, implicit?, has-factors?,
/// n-best>1?, json?)` selector of spec.md §4.7 step 5, reduced to the
/// fields that actually change which concrete sorter gets built.
#[derive(Debug, Clone, Default)]
pub struct SorterSelector {
    pub group_attr: Option<String>,
    pub distinct_attr: Option<String>,
    pub mva_attr: Option<String>,
    pub json_attr: Option<String>,
    pub implicit_aggs: Vec<AggSpec>,
    pub n_best: usize,
    pub max_matches: usize,
    pub use_kbuffer: bool,
}

/// Builds the concrete sorter named by `selector`. HAVING is validated at
/// this boundary (spec.md §7 "Parse/semantic" row): a HAVING filter can
/// only be attached to a sorter that actually groups.
pub fn build_sorter(comparator: Comparator, selector: SorterSelector, having_present: bool) -> Result<Box<dyn Sorter>> {
    let is_grouping = selector.group_attr.is_some() || selector.mva_attr.is_some() || selector.json_attr.is_some();
    if having_present && !is_grouping && selector.implicit_aggs.is_empty() {
        return Err(Error::User(UserError::HavingWithoutGroupBy));
    }

    if let Some(json_attr) = selector.json_attr {
        return Ok(Box::new(JsonGroupSorter::new(comparator, json_attr, selector.max_matches)));
    }
    if let Some(mva_attr) = selector.mva_attr {
        return Ok(Box::new(MvaGroupSorter::new(comparator, mva_attr, selector.distinct_attr, selector.max_matches)));
    }
    if let Some(group_attr) = selector.group_attr {
        if selector.n_best > 1 {
            return Ok(Box::new(GroupNBestSorter::new(comparator, group_attr, selector.n_best, selector.max_matches)));
        }
        return Ok(Box::new(GroupSorter::new(comparator, group_attr, selector.distinct_attr, selector.max_matches)));
    }
    if !selector.implicit_aggs.is_empty() {
        return Ok(Box::new(ImplicitSorter::new(selector.implicit_aggs)));
    }
    if selector.use_kbuffer {
        return Ok(Box::new(KBufferSorter::new(comparator, selector.max_matches)));
    }
    Ok(Box::new(HeapSorter::new(comparator, selector.max_matches)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AttrLocator;

    #[test]
    fn resolves_relevance_synonyms_to_weight_keypart() {
        let schema = Schema::new();
        let spec = resolve_sort_token(&SortToken { name: "@relevance", desc: true }, &schema).unwrap();
        assert_eq!(spec.keypart, Keypart::Weight);
        assert!(spec.desc);
    }

    #[test]
    fn rejects_mva_attribute_as_sort_key() {
        let mut schema = Schema::new();
        schema.add_attr("tags", AttrTypeCode::Uint32Set, AttrLocator::new(0, 0, false));
        let err = resolve_sort_token(&SortToken { name: "tags", desc: false }, &schema).unwrap_err();
        assert!(err.to_string().contains("multi-valued"));
    }

    #[test]
    fn rejects_unknown_sort_attribute() {
        let schema = Schema::new();
        let err = resolve_sort_token(&SortToken { name: "nope", desc: false }, &schema).unwrap_err();
        assert!(err.to_string().contains("unknown attribute"));
    }

    #[test]
    fn picks_heap_sorter_when_nothing_special_requested() {
        let comparator = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let selector = SorterSelector { max_matches: 10, ..Default::default() };
        let sorter = build_sorter(comparator, selector, false).unwrap();
        assert!(!sorter.is_groupby());
    }

    #[test]
    fn rejects_having_without_grouping() {
        let comparator = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let selector = SorterSelector { max_matches: 10, ..Default::default() };
        let err = match build_sorter(comparator, selector, true) {
            Err(e) => e,
            Ok(_) => panic!("expected an error"),
        };
        assert!(err.to_string().contains("HAVING"));
    }

    #[test]
    fn picks_group_sorter_when_group_attr_present() {
        let comparator = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let selector = SorterSelector { group_attr: Some("cat".into()), max_matches: 10, ..Default::default() };
        let sorter = build_sorter(comparator, selector, false).unwrap();
        assert!(sorter.is_groupby());
    }

    #[test]
    fn sorter_schema_layers_grouping_columns() {
        let base = Schema::new();
        let plan = SorterSchemaPlan { grouping: true, ..Default::default() };
        let schema = build_sorter_schema(&base, &plan);
        assert!(schema.find("@count").is_some());
        assert!(schema.find("@distinct").is_some());
        assert_eq!(base.len(), 0, "base schema must stay untouched");
    }

    #[test]
    fn stage_promotion_uses_the_earliest_referencer_but_waits_on_dependencies() {
        let stage = earliest_viable_stage(&[Stage::Sorter, Stage::Final], &[]);
        assert_eq!(stage, Stage::Sorter);

        let blocked = earliest_viable_stage(&[Stage::Prefilter], &[Stage::Presort]);
        assert_eq!(blocked, Stage::Presort);
    }
}
