//! Zone engine (spec.md §4.3), owned by the ranker.
//!
//! Each named zone is materialized lazily from two synthetic term cursors
//! (the zone-open and zone-close markers). A four-state FSM
//! (inside-span/outside-span/start-marker/end-marker) interleaves their
//! hits per document to produce a span list, memoized in a per-zone cache
//! ordered by docid. Nested starts of the same zone are no-ops; nested
//! ends extend the previous span (spec.md §3 "Zone" invariants).

use std::collections::HashMap;

use crate::docid::DocId;
use crate::hitpos::Hitpos;
use crate::qword::{Qword, QwordMatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoneLookup {
    Found,
    NoSpan,
    NoDocument,
}

#[derive(Debug, Clone, Default)]
struct ZoneDocSpans {
    docid: DocId,
    spans: Vec<(u32, u32)>,
}

struct ZoneCursors {
    open: Box<dyn Qword>,
    close: Box<dyn Qword>,
    cache: Vec<ZoneDocSpans>,
    open_exhausted: bool,
    close_exhausted: bool,
    pending_open: Option<QwordMatch>,
    pending_close: Option<QwordMatch>,
}

#[derive(Default)]
pub struct ZoneEngine {
    zones: HashMap<String, ZoneCursors>,
}

impl ZoneEngine {
    pub fn new() -> Self {
        ZoneEngine::default()
    }

    pub fn register_zone(&mut self, name: impl Into<String>, open: Box<dyn Qword>, close: Box<dyn Qword>) {
        self.zones.insert(
            name.into(),
            ZoneCursors {
                open,
                close,
                cache: Vec::new(),
                open_exhausted: false,
                close_exhausted: false,
                pending_open: None,
                pending_close: None,
            },
        );
    }

    /// Binary-searches the per-zone cache; on miss, advances the tag
    /// cursors until `docid`'s spans are resolved (or proven absent on
    /// both sides), then retries.
    pub fn is_in_zone(&mut self, zone: &str, docid: DocId, hit: Hitpos) -> ZoneLookup {
        let Some(cursors) = self.zones.get_mut(zone) else {
            return ZoneLookup::NoDocument;
        };
        if let Some(entry) = find_cached(&cursors.cache, docid) {
            return classify(entry, hit);
        }
        resolve_up_to(cursors, docid);
        match find_cached(&cursors.cache, docid) {
            Some(entry) => classify(entry, hit),
            None => ZoneLookup::NoDocument,
        }
    }

    /// Drops cached zone entries whose docid is `<= watermark`, called
    /// after every docs chunk, unless the query requested zonespan
    /// bookkeeping (in which case the caller simply does not call this).
    pub fn evict_up_to(&mut self, watermark: DocId) {
        for cursors in self.zones.values_mut() {
            cursors.cache.retain(|e| e.docid > watermark);
        }
    }
}

fn find_cached(cache: &[ZoneDocSpans], docid: DocId) -> Option<&ZoneDocSpans> {
    cache.binary_search_by_key(&docid, |e| e.docid).ok().map(|i| &cache[i])
}

fn classify(entry: &ZoneDocSpans, hit: Hitpos) -> ZoneLookup {
    let pos = hit.position();
    if entry.spans.iter().any(|&(s, e)| pos >= s && pos <= e) {
        ZoneLookup::Found
    } else {
        ZoneLookup::NoSpan
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Tag {
    Open,
    Close,
}

/// Advances both tag cursors, building span lists for every document up to
/// and including `target`, tolerating mismatched open/close docids by
/// skipping forward on whichever side lags.
fn resolve_up_to(cursors: &mut ZoneCursors, target: DocId) {
    loop {
        if cursors.pending_open.is_none() && !cursors.open_exhausted {
            let m = cursors.open.next_doc();
            cursors.pending_open = if m.is_end_of_stream() {
                cursors.open_exhausted = true;
                None
            } else {
                Some(m)
            };
        }
        if cursors.pending_close.is_none() && !cursors.close_exhausted {
            let m = cursors.close.next_doc();
            cursors.pending_close = if m.is_end_of_stream() {
                cursors.close_exhausted = true;
                None
            } else {
                Some(m)
            };
        }

        match (cursors.pending_open, cursors.pending_close) {
            (None, None) => return,
            (Some(m), None) => {
                cursors.pending_open = None;
                if m.docid > target {
                    return;
                }
            }
            (None, Some(m)) => {
                cursors.pending_close = None;
                if m.docid > target {
                    return;
                }
            }
            (Some(om), Some(cm)) if om.docid == cm.docid => {
                build_spans_for_doc(cursors, om, cm);
                cursors.pending_open = None;
                cursors.pending_close = None;
                if om.docid >= target {
                    return;
                }
            }
            (Some(om), Some(cm)) if om.docid < cm.docid => {
                // open without a matching close on this docid yet: broken
                // data or close lags; skip this open forward.
                cursors.pending_open = None;
                if om.docid > target {
                    return;
                }
            }
            (Some(_), Some(_)) => {
                // close lags behind open: skip the close forward.
                let cm = cursors.pending_close.take().unwrap();
                if cm.docid > target {
                    cursors.pending_close = Some(cm);
                    return;
                }
            }
        }
    }
}

fn build_spans_for_doc(cursors: &mut ZoneCursors, open_match: QwordMatch, close_match: QwordMatch) {
    let docid = open_match.docid;
    cursors.open.seek_hitlist(open_match.hitlist_position);
    cursors.close.seek_hitlist(close_match.hitlist_position);

    let mut events: Vec<(u32, Tag)> = Vec::new();
    loop {
        let h = cursors.open.next_hit();
        if h.is_empty() {
            break;
        }
        events.push((h.position(), Tag::Open));
    }
    loop {
        let h = cursors.close.next_hit();
        if h.is_empty() {
            break;
        }
        events.push((h.position(), Tag::Close));
    }
    events.sort_by_key(|&(pos, _)| pos);

    let mut spans: Vec<(u32, u32)> = Vec::new();
    let mut span_active = false;
    let mut pending_start = 0u32;
    for (pos, tag) in events {
        match tag {
            Tag::Open => {
                if !span_active {
                    pending_start = pos;
                    span_active = true;
                }
                // nested start: no-op
            }
            Tag::Close => {
                if span_active {
                    spans.push((pending_start, pos));
                    span_active = false;
                } else if let Some(last) = spans.last_mut() {
                    // nested end: extend the previous span
                    last.1 = pos;
                }
                // else: end with no matching start anywhere; tolerated, ignored
            }
        }
    }

    let idx = cursors.cache.binary_search_by_key(&docid, |e| e.docid).unwrap_or_else(|i| i);
    cursors.cache.insert(idx, ZoneDocSpans { docid, spans });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qword::InMemoryQword;

    fn hp(pos: u32) -> Hitpos {
        Hitpos::new(0, pos, false)
    }

    #[test]
    fn finds_a_hit_inside_a_simple_span() {
        let open = InMemoryQword::new(vec![(10, 1, vec![hp(2)])], false);
        let close = InMemoryQword::new(vec![(10, 1, vec![hp(8)])], false);
        let mut engine = ZoneEngine::new();
        engine.register_zone("heading", Box::new(open), Box::new(close));

        assert_eq!(engine.is_in_zone("heading", 10, hp(5)), ZoneLookup::Found);
        assert_eq!(engine.is_in_zone("heading", 10, hp(9)), ZoneLookup::NoSpan);
    }

    #[test]
    fn unknown_zone_or_docid_reports_no_document() {
        let mut engine = ZoneEngine::new();
        assert_eq!(engine.is_in_zone("missing", 1, hp(0)), ZoneLookup::NoDocument);
    }

    #[test]
    fn eviction_drops_entries_at_or_below_watermark() {
        let open = InMemoryQword::new(vec![(1, 1, vec![hp(0)])], false);
        let close = InMemoryQword::new(vec![(1, 1, vec![hp(5)])], false);
        let mut engine = ZoneEngine::new();
        engine.register_zone("z", Box::new(open), Box::new(close));
        assert_eq!(engine.is_in_zone("z", 1, hp(2)), ZoneLookup::Found);
        engine.evict_up_to(1);
        // cache was evicted, and both cursors are exhausted, so the
        // lookup now reports absence rather than re-finding the span.
        assert_eq!(engine.is_in_zone("z", 1, hp(2)), ZoneLookup::NoDocument);
    }
}
