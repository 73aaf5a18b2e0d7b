//! ExtHit: a hit record inside a hits chunk (spec.md §3).

use crate::docid::DocId;
use crate::hitpos::Hitpos;

/// One matched hit, as returned in a hits chunk.
///
/// `querypos` is the 1-based atom position of the originating keyword in
/// the query. For folded phrase/proximity hits `spanlen > 1`: `matchlen`
/// covers the whole span, `weight` carries the LCS contribution, and
/// `qpos_mask` flags which relative query positions participated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtHit {
    pub docid: DocId,
    pub hitpos: Hitpos,
    pub querypos: u32,
    /// Which child/branch this hit originated from, as remapped by two-arg
    /// operators to preserve left/right identity for the ranker.
    pub nodepos: u32,
    pub spanlen: u32,
    pub matchlen: u32,
    pub weight: u32,
    pub qpos_mask: u64,
}

impl ExtHit {
    pub fn single(docid: DocId, hitpos: Hitpos, querypos: u32) -> Self {
        ExtHit {
            docid,
            hitpos,
            querypos,
            nodepos: 0,
            spanlen: 1,
            matchlen: 1,
            weight: 1,
            qpos_mask: 1u64 << (querypos.min(63)),
        }
    }
}

/// Ordering key for a hits chunk: `(docid, hitpos, querypos)` ascending,
/// except when `reverse_qpos` is set (the AND `qpos-reverse` flag of
/// spec.md §4.2.3), in which case `querypos` ties break descending.
pub fn hit_order_key(hit: &ExtHit, reverse_qpos: bool) -> (DocId, Hitpos, i64) {
    let qpos = if reverse_qpos { -(hit.querypos as i64) } else { hit.querypos as i64 };
    (hit.docid, hit.hitpos, qpos)
}

/// Validate the universal chunk invariant of spec.md §8 property 3 for the
/// non-reversed case.
pub fn assert_valid_hits_chunk(hits: &[ExtHit], reverse_qpos: bool) {
    let mut prev: Option<(DocId, Hitpos, i64)> = None;
    for h in hits {
        let key = hit_order_key(h, reverse_qpos);
        if let Some(p) = prev {
            debug_assert!(key > p, "hits chunk must be strictly ascending in (docid, hitpos, querypos)");
        }
        prev = Some(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_hit_has_matchlen_one() {
        let h = ExtHit::single(7, Hitpos::new(0, 3, false), 2);
        assert_eq!(h.spanlen, 1);
        assert_eq!(h.matchlen, 1);
        assert_eq!(h.querypos, 2);
    }

    #[test]
    fn reverse_qpos_flips_tie_break() {
        let d = 1;
        let p = Hitpos::new(0, 0, false);
        let a = ExtHit { querypos: 1, ..ExtHit::single(d, p, 1) };
        let b = ExtHit { querypos: 2, ..ExtHit::single(d, p, 2) };
        assert!(hit_order_key(&a, false) < hit_order_key(&b, false));
        assert!(hit_order_key(&a, true) > hit_order_key(&b, true));
    }
}
