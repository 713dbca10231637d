//! Run-wide request budget

use std::sync::atomic::{AtomicI64, Ordering};

/// Soft cap on the number of requests a run attempts
///
/// Each worker takes one unit before every attempt. The first take that
/// drives the counter negative is the signal to stop the run; workers that
/// took a unit just before that still finish their attempt.
#[derive(Debug)]
pub struct RequestBudget {
    remaining: Option<AtomicI64>,
}

impl RequestBudget {
    /// Budget of `requests`; zero or negative means unbounded
    pub fn new(requests: i64) -> Self {
        Self {
            remaining: (requests > 0).then(|| AtomicI64::new(requests)),
        }
    }

    /// A budget that never runs out
    pub fn unbounded() -> Self {
        Self { remaining: None }
    }

    /// Take one unit; `false` once the budget is spent
    pub fn try_take(&self) -> bool {
        match &self.remaining {
            Some(remaining) => remaining.fetch_sub(1, Ordering::AcqRel) - 1 >= 0,
            None => true,
        }
    }

    /// Whether a budget is set at all
    pub fn is_bounded(&self) -> bool {
        self.remaining.is_some()
    }

    /// Units left, negative once workers overshot the cap
    pub fn remaining(&self) -> Option<i64> {
        self.remaining
            .as_ref()
            .map(|remaining| remaining.load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    #[test]
    fn test_unbounded_budget() {
        for budget in [
            RequestBudget::unbounded(),
            RequestBudget::new(0),
            RequestBudget::new(-1),
        ] {
            assert!(!budget.is_bounded());
            for _ in 0..1000 {
                assert!(budget.try_take());
            }
            assert!(budget.remaining().is_none());
        }
    }

    #[test]
    fn test_bounded_budget_runs_out() {
        let budget = RequestBudget::new(3);
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(budget.try_take());
        assert!(!budget.try_take());
        assert!(!budget.try_take());
        assert_eq!(budget.remaining(), Some(-2));
    }

    #[test]
    fn test_concurrent_takes_grant_exactly_budget() {
        let budget = Arc::new(RequestBudget::new(1000));
        let granted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                let granted = Arc::clone(&granted);
                std::thread::spawn(move || {
                    while budget.try_take() {
                        granted.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(granted.load(Ordering::Relaxed), 1000);
    }
}
