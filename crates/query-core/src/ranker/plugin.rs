//! The `plugin` ranker variant (spec.md §4.4): weight computation is
//! delegated entirely to host-provided callbacks, so the core only owns
//! the call sequence (`init` once per query, `update` per hit, `finalize`
//! per document), not the scoring logic itself.

use crate::docid::DocId;
use crate::exthit::ExtHit;
use crate::ranker::{FieldLens, Match, RankerState};

/// Host-provided scoring callbacks (spec.md §4.4 "host-provided
/// init/update/finalize callbacks"). `init` runs once when the ranker is
/// constructed, not per document; `Box<dyn ...>` keeps the trait
/// object-safe for an embedder that only has a dynamic plugin handle.
pub trait RankerPlugin {
    fn init(&mut self) {}
    fn update(&mut self, hit: &ExtHit);
    fn finalize(&mut self, match_: &mut Match) -> i64;
    fn reset_doc(&mut self) {}
}

pub struct PluginState<P: RankerPlugin> {
    plugin: P,
    initialized: bool,
}

impl<P: RankerPlugin> PluginState<P> {
    pub fn new(plugin: P) -> Self {
        PluginState { plugin, initialized: false }
    }
}

impl<P: RankerPlugin> RankerState for PluginState<P> {
    fn start_doc(&mut self, _docid: DocId) {
        if !self.initialized {
            self.plugin.init();
            self.initialized = true;
        }
        self.plugin.reset_doc();
    }

    fn update(&mut self, hit: &ExtHit, _field_weight: &[f32]) {
        self.plugin.update(hit);
    }

    fn finalize(&mut self, match_: &mut Match, _lens: FieldLens<'_>) -> i64 {
        self.plugin.finalize(match_)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hitpos::Hitpos;

    struct CountingPlugin {
        hits: i64,
        inits: u32,
    }

    impl RankerPlugin for CountingPlugin {
        fn init(&mut self) {
            self.inits += 1;
        }

        fn update(&mut self, _hit: &ExtHit) {
            self.hits += 1;
        }

        fn finalize(&mut self, _match_: &mut Match) -> i64 {
            std::mem::take(&mut self.hits)
        }
    }

    #[test]
    fn plugin_initializes_once_and_counts_hits_per_document() {
        let mut s = PluginState::new(CountingPlugin { hits: 0, inits: 0 });
        let lens = FieldLens(&[]);
        let mut m = Match::new(1);
        s.start_doc(1);
        s.update(&ExtHit::single(1, Hitpos::new(0, 0, false), 1), &[]);
        s.update(&ExtHit::single(1, Hitpos::new(0, 1, false), 2), &[]);
        assert_eq!(s.finalize(&mut m, lens), 2);
        s.start_doc(2);
        s.update(&ExtHit::single(2, Hitpos::new(0, 0, false), 1), &[]);
        assert_eq!(s.finalize(&mut m, lens), 1);
        assert_eq!(s.plugin.inits, 1);
    }
}
