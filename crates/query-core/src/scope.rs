//! Position/field/zone restriction spec (spec.md §4.2.9), named `MatchScope`
//! to avoid the overloaded word "spec" inside the crate itself.

/// Travels top-down during operator-tree construction so that field and
/// zone scoping happen at term leaves, not after matching.
#[derive(Debug, Clone, Default)]
pub struct MatchScope {
    pub field_mask: u64,
    pub max_field_pos: Option<u32>,
    pub zone_ids: Vec<u32>,
    pub zonespan: bool,
    /// `true` when the index has more fields than a 64-bit mask can
    /// represent; term leaves then materialize the full mask via
    /// `collect_hit_mask` instead of AND-ing against `field_mask`
    /// (spec.md §4.2.1).
    pub wide_fields: bool,
}

impl MatchScope {
    pub fn all_fields() -> Self {
        MatchScope {
            field_mask: u64::MAX,
            max_field_pos: None,
            zone_ids: Vec::new(),
            zonespan: false,
            wide_fields: false,
        }
    }

    pub fn with_field_mask(field_mask: u64) -> Self {
        MatchScope { field_mask, ..Self::all_fields() }
    }

    pub fn wide(field_mask: u64) -> Self {
        MatchScope { field_mask, wide_fields: true, ..Self::all_fields() }
    }

    pub fn accepts_field(&self, field: u32) -> bool {
        if self.wide_fields || field >= 64 {
            // wide-field indexes (more fields than a 64-bit mask can
            // represent) are handled by the caller via `collect_hit_mask`
            // (spec.md §4.2.1); by convention fields outside the mask's
            // reach are treated as accepted here and filtered upstream.
            true
        } else {
            (self.field_mask >> field) & 1 != 0
        }
    }

    pub fn is_wide_fields(&self) -> bool {
        self.wide_fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scope_accepts_field_zero() {
        let scope = MatchScope::all_fields();
        assert!(scope.accepts_field(0));
        assert!(scope.accepts_field(63));
    }

    #[test]
    fn field_mask_restricts_lower_bits() {
        let scope = MatchScope::with_field_mask(0b101);
        assert!(scope.accepts_field(0));
        assert!(!scope.accepts_field(1));
        assert!(scope.accepts_field(2));
    }

    #[test]
    fn wide_fields_accepts_everything_at_this_layer() {
        let scope = MatchScope::wide(0b1);
        assert!(scope.is_wide_fields());
        assert!(scope.accepts_field(200));
    }
}
