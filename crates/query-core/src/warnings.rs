//! Shared warning sink (spec.md §4.2, §7).
//!
//! Leaves set a shared warning string and return `None`; parents observe
//! `None` and terminate their own streams in order. This is the
//! user-visible degradation channel, distinct from the `tracing`
//! diagnostics emitted alongside it (see `SPEC_FULL.md` §2).

use std::sync::Mutex;

#[derive(Default)]
pub struct WarningSink {
    message: Mutex<Option<String>>,
}

impl WarningSink {
    pub fn new() -> Self {
        WarningSink::default()
    }

    /// Record a warning. Only the first warning of a query is kept, since
    /// callers surface at most one `warning?` field (spec.md §7).
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(%message, "query core warning");
        let mut slot = self.message.lock().unwrap();
        if slot.is_none() {
            *slot = Some(message);
        }
    }

    pub fn take(&self) -> Option<String> {
        self.message.lock().unwrap().take()
    }

    pub fn peek(&self) -> Option<String> {
        self.message.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_warning_wins() {
        let sink = WarningSink::new();
        sink.warn("deadline exceeded");
        sink.warn("second warning should be dropped");
        assert_eq!(sink.peek().as_deref(), Some("deadline exceeded"));
    }

    #[test]
    fn take_clears_the_slot() {
        let sink = WarningSink::new();
        sink.warn("x");
        assert!(sink.take().is_some());
        assert!(sink.peek().is_none());
    }
}
