//! Cancellation, deadlines and per-operation cost budgets (spec.md §5).
//!
//! Grounded on `crates/milli/src/search/new/ranking_rules.rs`'s
//! `TimeBudget`, threaded through every ranking-rule stage so that a long
//! search returns cleanly instead of blocking; generalized here into a
//! single [`Budget`] that every leaf consults before doing I/O.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Process-wide "shutdown in progress" flag, shared by every query running
/// in the process.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-query absolute deadline.
#[derive(Clone, Copy)]
pub struct Deadline(Instant);

impl Deadline {
    pub fn from_now(timeout: Duration) -> Self {
        Deadline(Instant::now() + timeout)
    }

    pub fn none() -> Self {
        // far enough in the future to never trip in a single test run
        Deadline(Instant::now() + Duration::from_secs(365 * 24 * 3600))
    }

    pub fn is_exceeded(&self) -> bool {
        Instant::now() >= self.0
    }
}

/// Per-operation costs decremented from a nanosecond-denominated budget.
#[derive(Debug, Clone, Copy)]
pub struct OpCosts {
    pub doc: i64,
    pub hit: i64,
    pub skip: i64,
    pub r#match: i64,
}

impl Default for OpCosts {
    fn default() -> Self {
        OpCosts { doc: 1, hit: 1, skip: 1, r#match: 4 }
    }
}

/// An optional nanosecond budget, decremented as work is done. Exhaustion
/// behaves like a deadline: the current leaf stops and returns `None` with
/// a warning (spec.md §5 "Budgets").
#[derive(Clone)]
pub struct Budget {
    remaining_ns: Option<Arc<AtomicI64>>,
    costs: OpCosts,
}

impl Budget {
    pub fn unlimited() -> Self {
        Budget { remaining_ns: None, costs: OpCosts::default() }
    }

    pub fn limited(nanoseconds: i64, costs: OpCosts) -> Self {
        Budget { remaining_ns: Some(Arc::new(AtomicI64::new(nanoseconds))), costs }
    }

    /// Charge `units * per_unit_cost` against the budget and report whether
    /// it is now exhausted.
    fn charge(&self, units: i64, per_unit_cost: i64) -> bool {
        match &self.remaining_ns {
            None => false,
            Some(remaining) => {
                let spent = units.saturating_mul(per_unit_cost);
                let left = remaining.fetch_sub(spent, Ordering::Relaxed) - spent;
                left <= 0
            }
        }
    }

    pub fn charge_docs(&self, count: usize) -> bool {
        self.charge(count as i64, self.costs.doc)
    }

    pub fn charge_hits(&self, count: usize) -> bool {
        self.charge(count as i64, self.costs.hit)
    }

    pub fn charge_skips(&self, count: usize) -> bool {
        self.charge(count as i64, self.costs.skip)
    }

    pub fn charge_matches(&self, count: usize) -> bool {
        self.charge(count as i64, self.costs.r#match)
    }

    pub fn is_exhausted(&self) -> bool {
        match &self.remaining_ns {
            None => false,
            Some(remaining) => remaining.load(Ordering::Relaxed) <= 0,
        }
    }
}

/// The three polled, non-forced interruption mechanisms bundled together,
/// consulted by every leaf before doing I/O (spec.md §5, "Suspension
/// points", "Cancellation & deadlines").
#[derive(Clone)]
pub struct ExecutionContext {
    pub deadline: Deadline,
    pub cancellation: CancellationToken,
    pub budget: Budget,
}

impl ExecutionContext {
    pub fn unbounded() -> Self {
        ExecutionContext {
            deadline: Deadline::none(),
            cancellation: CancellationToken::new(),
            budget: Budget::unlimited(),
        }
    }

    /// Returns `Some(reason)` if the query should stop now.
    pub fn should_stop(&self) -> Option<&'static str> {
        if self.cancellation.is_cancelled() {
            return Some("shutdown in progress");
        }
        if self.deadline.is_exceeded() {
            return Some("query deadline exceeded");
        }
        if self.budget.is_exhausted() {
            return Some("query budget exhausted");
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_token_is_shared() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn deadline_in_the_past_is_exceeded() {
        let d = Deadline::from_now(Duration::from_secs(0));
        std::thread::sleep(Duration::from_millis(1));
        assert!(d.is_exceeded());
    }

    #[test]
    fn budget_exhausts_after_enough_charges() {
        let budget = Budget::limited(10, OpCosts { doc: 3, hit: 1, skip: 1, r#match: 1 });
        assert!(!budget.charge_docs(1));
        assert!(!budget.charge_docs(1));
        assert!(budget.charge_docs(2));
        assert!(budget.is_exhausted());
    }

    #[test]
    fn unlimited_budget_never_exhausts() {
        let budget = Budget::unlimited();
        assert!(!budget.charge_docs(usize::MAX / 2));
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn should_stop_reports_first_tripped_reason() {
        let ctx = ExecutionContext::unbounded();
        assert!(ctx.should_stop().is_none());
        ctx.cancellation.cancel();
        assert_eq!(ctx.should_stop(), Some("shutdown in progress"));
    }
}
