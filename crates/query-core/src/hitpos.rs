//! Hitpos: a packed positional token (spec.md §3).
//!
//! Bit layout (most to least significant, 32 bits total):
//!
//! ```text
//! [ field : 8 bits ][ position : 23 bits ][ field_end : 1 bit ]
//! ```
//!
//! Packing `field` in the upper bits and `position` in the middle means the
//! raw integer ordering of two `Hitpos` values already matches the
//! `(field, position)` ordering the producer must emit hits in; `field_end`
//! is the least-significant bit and only ever breaks a tie between a
//! same-position start/end pair, which is the §9 "open question" this crate
//! resolves by keeping the inline-hit marker entirely outside this layout
//! (see `qword.rs`).

const FIELD_BITS: u32 = 8;
const POSITION_BITS: u32 = 23;
const FIELD_END_BITS: u32 = 1;

const FIELD_SHIFT: u32 = POSITION_BITS + FIELD_END_BITS;
const POSITION_SHIFT: u32 = FIELD_END_BITS;

const FIELD_MASK: u32 = (1 << FIELD_BITS) - 1;
const POSITION_MASK: u32 = (1 << POSITION_BITS) - 1;
const FIELD_END_MASK: u32 = (1 << FIELD_END_BITS) - 1;

/// A packed positional token: which field, which position within the field,
/// and whether this hit sits on the field's last token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Hitpos(u32);

/// Sentinel returned by `Qword::next_hit` at document end.
pub const EMPTY_HIT: Hitpos = Hitpos(0);

impl Hitpos {
    pub fn new(field: u32, position: u32, field_end: bool) -> Self {
        debug_assert!(field <= FIELD_MASK, "field {field} overflows {FIELD_BITS} bits");
        debug_assert!(
            position <= POSITION_MASK,
            "position {position} overflows {POSITION_BITS} bits"
        );
        let raw = ((field & FIELD_MASK) << FIELD_SHIFT)
            | ((position & POSITION_MASK) << POSITION_SHIFT)
            | (field_end as u32 & FIELD_END_MASK);
        Hitpos(raw)
    }

    pub fn from_raw(raw: u32) -> Self {
        Hitpos(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn field(self) -> u32 {
        (self.0 >> FIELD_SHIFT) & FIELD_MASK
    }

    pub fn position(self) -> u32 {
        (self.0 >> POSITION_SHIFT) & POSITION_MASK
    }

    pub fn is_end(self) -> bool {
        (self.0 & FIELD_END_MASK) != 0
    }

    pub fn is_empty(self) -> bool {
        self == EMPTY_HIT
    }

    /// Same field and position, ignoring the field-end flag. Used by the
    /// zone FSM and the N-way spine to compare positions without caring
    /// whether either side happened to land on a field boundary.
    pub fn same_field_position(self, other: Hitpos) -> bool {
        self.field() == other.field() && self.position() == other.position()
    }
}

impl std::fmt::Display for Hitpos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "f{}:p{}{}", self.field(), self.position(), if self.is_end() { "$" } else { "" })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_field_position_end() {
        let h = Hitpos::new(3, 1000, true);
        assert_eq!(h.field(), 3);
        assert_eq!(h.position(), 1000);
        assert!(h.is_end());
    }

    #[test]
    fn raw_ordering_matches_field_then_position() {
        let a = Hitpos::new(0, 5, false);
        let b = Hitpos::new(0, 6, false);
        let c = Hitpos::new(1, 0, false);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn field_end_breaks_ties_last() {
        let start = Hitpos::new(2, 10, false);
        let end = Hitpos::new(2, 10, true);
        assert!(start < end);
        assert!(start.same_field_position(end));
    }

    #[test]
    fn empty_hit_is_field_zero_position_zero() {
        assert_eq!(EMPTY_HIT.field(), 0);
        assert_eq!(EMPTY_HIT.position(), 0);
        assert!(EMPTY_HIT.is_empty());
    }
}
