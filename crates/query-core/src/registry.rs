//! ExtQword registry and the dictionary/Qword factory contract (spec.md
//! §3, §6).
//!
//! Grounded on `crates/milli/src/search/new/query_term/mod.rs`'s sharing
//! of one `LocatedQueryTerm` per surface word across the query: every
//! `[MODULE]` here (term leaves, phrase/proximity/near, quorum) that
//! refers to the same keyword text shares one [`ExtQword`] entry so that
//! IDF and expansion bookkeeping happen exactly once.

use std::collections::HashMap;

use crate::qword::Qword;

/// One unique-keyword registry entry, shared by every node referring to
/// the same surface word.
pub struct ExtQword {
    pub word: String,
    pub dict_word: String,
    pub docs: u64,
    pub hits: u64,
    pub idf: f32,
    pub boost: f32,
    /// 1-based atom position of this keyword's first occurrence in the
    /// query text.
    pub query_pos: u32,
    pub expanded: bool,
    pub excluded: bool,
}

/// Registry of unique keywords seen while walking an operator tree's
/// `get_qwords` pass. `max_qpos` is defined here, once, as the highest
/// assigned query position (i.e. counting each *unique* keyword's
/// position slot once) per `DESIGN.md`'s open-question decision #4.
#[derive(Default)]
pub struct QwordRegistry {
    by_word: HashMap<String, usize>,
    entries: Vec<ExtQword>,
}

impl QwordRegistry {
    pub fn new() -> Self {
        QwordRegistry::default()
    }

    /// Register (or fetch) the entry for `word` at `query_pos`. Returns the
    /// stable index used to reference this entry from operator nodes.
    pub fn intern(&mut self, word: &str, dict_word: &str, query_pos: u32) -> usize {
        if let Some(&idx) = self.by_word.get(word) {
            return idx;
        }
        let idx = self.entries.len();
        self.entries.push(ExtQword {
            word: word.to_owned(),
            dict_word: dict_word.to_owned(),
            docs: 0,
            hits: 0,
            idf: 0.0,
            boost: 1.0,
            query_pos,
            expanded: false,
            excluded: false,
        });
        self.by_word.insert(word.to_owned(), idx);
        idx
    }

    pub fn get(&self, idx: usize) -> &ExtQword {
        &self.entries[idx]
    }

    pub fn get_mut(&mut self, idx: usize) -> &mut ExtQword {
        &mut self.entries[idx]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Highest query position assigned to any unique keyword so far.
    pub fn max_qpos(&self) -> u32 {
        self.entries.iter().map(|e| e.query_pos).max().unwrap_or(0)
    }

    /// Fill `docs`/`hits` from a spawned Qword, then (re-)compute IDF.
    /// Idempotent per spec.md §8 property 5: calling this twice for the
    /// same totals does not change the computed IDF.
    pub fn set_qword_stats(&mut self, idx: usize, docs: u64, hits: u64, total_docs: u64) {
        let entry = self.get_mut(idx);
        entry.docs = docs;
        entry.hits = hits;
        entry.idf = compute_idf(docs, total_docs);
    }
}

/// Classic smoothed IDF: `ln((total_docs - docs + 0.5) / (docs + 0.5) + 1)`,
/// clamped to be non-negative.
pub fn compute_idf(docs: u64, total_docs: u64) -> f32 {
    if total_docs == 0 {
        return 0.0;
    }
    let docs = docs as f64;
    let total_docs = total_docs as f64;
    let idf = ((total_docs - docs + 0.5) / (docs + 0.5) + 1.0).ln();
    idf.max(0.0) as f32
}

/// Factory contract for spawning and setting up a [`Qword`] for a keyword
/// (spec.md §6, "Inbound: dictionary/Qword factory").
pub trait QwordSetup {
    type W: Qword;

    /// Construct a new cursor for `keyword`.
    fn spawn(&self, keyword: &str) -> Self::W;

    /// Fill in `docs`, `hits`, skiplist and readers on an already-spawned
    /// cursor; returns `false` if the keyword does not exist in the
    /// dictionary at all.
    fn setup(&self, qword: &mut Self::W) -> bool;

    /// Whether this index stores hitlists inline in the doclist (as
    /// opposed to in an external hitlist file).
    fn hitlist_is_inline(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_the_same_word_twice_returns_the_same_index() {
        let mut reg = QwordRegistry::new();
        let a = reg.intern("quick", "quick", 1);
        let b = reg.intern("quick", "quick", 1);
        assert_eq!(a, b);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn max_qpos_is_the_highest_unique_position() {
        let mut reg = QwordRegistry::new();
        reg.intern("a", "a", 1);
        reg.intern("b", "b", 2);
        reg.intern("a", "a", 1); // duplicate keyword, same position slot
        assert_eq!(reg.max_qpos(), 2);
    }

    #[test]
    fn idf_is_idempotent() {
        let mut reg = QwordRegistry::new();
        let idx = reg.intern("fox", "fox", 1);
        reg.set_qword_stats(idx, 10, 20, 1000);
        let first = reg.get(idx).idf;
        reg.set_qword_stats(idx, 10, 20, 1000);
        let second = reg.get(idx).idf;
        assert_eq!(first, second);
    }

    #[test]
    fn idf_is_zero_for_empty_index() {
        assert_eq!(compute_idf(0, 0), 0.0);
    }

    #[test]
    fn rarer_terms_have_higher_idf() {
        let rare = compute_idf(2, 1000);
        let common = compute_idf(500, 1000);
        assert!(rare > common);
    }
}
