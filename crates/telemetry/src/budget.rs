//! Shared call-budget counter.
//!
//! Sub-model calls from concurrent workers draw from one counter. The check
//! and the increment are a single compare-and-swap, so the ceiling can never
//! be overshot by racing workers.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::TelemetryError;

/// A ceiling on the number of calls a run may issue.
#[derive(Debug)]
pub struct CallBudget {
    limit: u64,
    used: AtomicU64,
}

impl CallBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Reserve one call. Returns the 1-based call number, or
    /// `BudgetExceeded` without changing the counter.
    pub fn try_acquire(&self) -> Result<u64, TelemetryError> {
        let mut current = self.used.load(Ordering::Acquire);
        loop {
            if current >= self.limit {
                return Err(TelemetryError::BudgetExceeded {
                    used: current,
                    limit: self.limit,
                });
            }
            match self.used.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(current + 1),
                Err(actual) => current = actual,
            }
        }
    }

    /// Return an unused reservation (the call was never dispatched).
    pub fn release(&self) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn remaining(&self) -> u64 {
        self.limit.saturating_sub(self.used())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn acquires_up_to_limit_then_fails() {
        let budget = CallBudget::new(2);
        assert_eq!(budget.try_acquire().unwrap(), 1);
        assert_eq!(budget.try_acquire().unwrap(), 2);
        let err = budget.try_acquire().unwrap_err();
        assert!(matches!(err, TelemetryError::BudgetExceeded { used: 2, limit: 2 }));
        assert_eq!(budget.used(), 2);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn zero_limit_always_fails() {
        let budget = CallBudget::new(0);
        assert!(budget.try_acquire().is_err());
    }

    #[test]
    fn release_returns_reservation() {
        let budget = CallBudget::new(1);
        budget.try_acquire().unwrap();
        budget.release();
        assert_eq!(budget.remaining(), 1);
        budget.release();
        assert_eq!(budget.used(), 0);
    }

    #[test]
    fn concurrent_acquire_never_overshoots() {
        let budget = Arc::new(CallBudget::new(100));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let b = budget.clone();
                std::thread::spawn(move || (0..50).filter(|_| b.try_acquire().is_ok()).count())
            })
            .collect();
        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 100);
        assert_eq!(budget.used(), 100);
    }
}
