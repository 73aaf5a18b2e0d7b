//! Binary min-heap top-K sorter (spec.md §4.6 "Heap top-K"): `push`
//! compares the candidate against the current worst kept match; on
//! overflow the root is replaced and sifted down. `HeapEntry::Ord`
//! delegates to the comparator, where `Less` means "ranks first"; since
//! `BinaryHeap` roots its comparator-greatest element, the root is always
//! the worst currently-kept match, exactly the one eviction needs to
//! compare against. Each entry carries a shared handle to the comparator
//! so `Ord` can delegate to it without unsafe code.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::ranker::Match;
use crate::sorter::{Comparator, Sorter};

struct HeapEntry {
    m: Match,
    comparator: Rc<Comparator>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.comparator.compare(&self.m, &other.m) == Ordering::Equal
    }
}
impl Eq for HeapEntry {}
impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator.compare(&self.m, &other.m)
    }
}

/// Heap keyed by `comparator`, bounded to `max_matches`; the root is
/// always the worst kept match.
pub struct HeapSorter {
    comparator: Rc<Comparator>,
    max_matches: usize,
    heap: BinaryHeap<HeapEntry>,
}

impl HeapSorter {
    pub fn new(comparator: Comparator, max_matches: usize) -> Self {
        HeapSorter { comparator: Rc::new(comparator), max_matches, heap: BinaryHeap::new() }
    }

    fn wrap(&self, m: Match) -> HeapEntry {
        HeapEntry { m, comparator: Rc::clone(&self.comparator) }
    }
}

impl Sorter for HeapSorter {
    fn push(&mut self, m: Match) -> bool {
        if self.heap.len() < self.max_matches {
            let entry = self.wrap(m);
            self.heap.push(entry);
            return true;
        }
        let candidate_is_worse_or_tied = {
            let worst = &self.heap.peek().unwrap().m;
            self.comparator.compare(&m, worst) != Ordering::Less
        };
        if candidate_is_worse_or_tied {
            false
        } else {
            self.heap.pop();
            self.heap.push(self.wrap(m));
            true
        }
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        let mut all: Vec<Match> = self.heap.drain().map(|e| e.m).collect();
        let comparator = Rc::clone(&self.comparator);
        all.sort_by(|a, b| comparator.compare(a, b));
        let mut count = 0;
        for m in all {
            if having.map(|f| f(&m)).unwrap_or(true) {
                out.push(m);
                count += 1;
            }
        }
        count
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        for e in &self.heap {
            visit(&e.m);
        }
    }

    fn get_length(&self) -> i32 {
        self.heap.len() as i32
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
    fn keeps_only_the_k_best_by_weight() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = HeapSorter::new(cmp, 2);
        for (docid, weight) in [(1, 10), (2, 50), (3, 5), (4, 100)] {
            s.push(m(docid, weight));
        }
        let mut out = Vec::new();
        s.flatten(&mut out, None);
        let docids: Vec<u32> = out.iter().map(|m| m.docid).collect();
        assert_eq!(docids, vec![4, 2]);
    }

    #[test]
    fn flatten_respects_having_filter() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = HeapSorter::new(cmp, 10);
        s.push(m(1, 10));
        s.push(m(2, 20));
        let mut out = Vec::new();
        let count = s.flatten(&mut out, Some(&|m| m.weight >= 15));
        assert_eq!(count, 1);
        assert_eq!(out[0].docid, 2);
    }
}
