//! K-buffer sorter (spec.md §4.6 "K-buffer"): allocates `4·K` slack so
//! `push` is a plain append until the buffer fills, then does one full
//! sort + truncate back to `K`. Cheaper per-push than the heap variant at
//! the cost of worse worst-case memory, exactly as spec.md notes.

use crate::ranker::Match;
use crate::sorter::{Comparator, Sorter};

const SLACK_FACTOR: usize = 4;

pub struct KBufferSorter {
    comparator: Comparator,
    k: usize,
    buf: Vec<Match>,
}

impl KBufferSorter {
    pub fn new(comparator: Comparator, k: usize) -> Self {
        KBufferSorter { comparator, k, buf: Vec::with_capacity(k * SLACK_FACTOR) }
    }

    fn compact(&mut self) {
        self.buf.sort_by(|a, b| self.comparator.compare(a, b));
        self.buf.truncate(self.k);
    }
}

impl Sorter for KBufferSorter {
    fn push(&mut self, m: Match) -> bool {
        self.buf.push(m);
        if self.buf.len() >= self.k * SLACK_FACTOR {
            self.compact();
        }
        true
    }

    fn flatten(&mut self, out: &mut Vec<Match>, having: Option<&dyn Fn(&Match) -> bool>) -> usize {
        self.compact();
        let mut count = 0;
        for m in self.buf.drain(..) {
            if having.map(|f| f(&m)).unwrap_or(true) {
                out.push(m);
                count += 1;
            }
        }
        count
    }

    fn finalize(&self, visit: &mut dyn FnMut(&Match)) {
        for m in &self.buf {
            visit(m);
        }
    }

    fn get_length(&self) -> i32 {
        self.buf.len().min(self.k) as i32
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
    fn truncates_to_k_after_slack_fills() {
        let cmp = Comparator::new(vec![KeypartSpec::weight(true)]).unwrap();
        let mut s = KBufferSorter::new(cmp, 2);
        for i in 0..10u32 {
            s.push(m(i, i as i64));
        }
        let mut out = Vec::new();
        s.flatten(&mut out, None);
        let docids: Vec<u32> = out.iter().map(|m| m.docid).collect();
        assert_eq!(docids, vec![9, 8]);
    }
}
