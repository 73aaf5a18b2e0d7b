//! Index schema and result-set schema (spec.md §3).

use crate::constants::AttrTypeCode;

/// Where an attribute's bits live inside a document's attribute row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttrLocator {
    pub bit_offset: u32,
    pub bit_count: u32,
    /// `true` if the attribute lives in the match's owned dynamic row
    /// rather than the borrowed static (on-disk) row.
    pub dynamic: bool,
}

impl AttrLocator {
    pub fn new(bit_offset: u32, bit_count: u32, dynamic: bool) -> Self {
        AttrLocator { bit_offset, bit_count, dynamic }
    }
}

#[derive(Debug, Clone)]
pub struct AttrDef {
    pub name: String,
    pub attr_type: AttrTypeCode,
    pub locator: AttrLocator,
}

/// An index schema (on-disk attributes) or a result-set schema (index
/// schema plus computed/aggregated/remapped attributes on dynamic space).
#[derive(Debug, Clone, Default)]
pub struct Schema {
    attrs: Vec<AttrDef>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    pub fn add_attr(&mut self, name: impl Into<String>, attr_type: AttrTypeCode, locator: AttrLocator) -> usize {
        self.attrs.push(AttrDef { name: name.into(), attr_type, locator });
        self.attrs.len() - 1
    }

    pub fn find(&self, name: &str) -> Option<(usize, &AttrDef)> {
        self.attrs.iter().enumerate().find(|(_, a)| a.name == name)
    }

    pub fn get(&self, index: usize) -> Option<&AttrDef> {
        self.attrs.get(index)
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrDef> {
        self.attrs.iter()
    }

    /// Layer a dynamic/computed attribute on top of this schema, producing
    /// a new result-set schema; used by the sorter factory (spec.md §4.7
    /// step 1) to add `@geodist`/`@expr`/`@groupby`/`@count`/`@distinct`/
    /// `@groupbystr` and per-select-expression columns.
    pub fn with_dynamic_attr(
        &self,
        name: impl Into<String>,
        attr_type: AttrTypeCode,
        bit_offset: u32,
        bit_count: u32,
    ) -> Schema {
        let mut extended = self.clone();
        extended.add_attr(name, attr_type, AttrLocator::new(bit_offset, bit_count, true));
        extended
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_returns_locator() {
        let mut schema = Schema::new();
        schema.add_attr("price", AttrTypeCode::Float, AttrLocator::new(0, 32, false));
        let (idx, attr) = schema.find("price").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(attr.locator.bit_count, 32);
        assert!(!attr.locator.dynamic);
    }

    #[test]
    fn with_dynamic_attr_preserves_base_schema() {
        let mut base = Schema::new();
        base.add_attr("price", AttrTypeCode::Float, AttrLocator::new(0, 32, false));
        let extended = base.with_dynamic_attr("@count", AttrTypeCode::Integer, 32, 32);
        assert_eq!(base.len(), 1);
        assert_eq!(extended.len(), 2);
        assert!(extended.find("@count").unwrap().1.locator.dynamic);
    }
}
