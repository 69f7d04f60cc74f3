//! Shared item budgets
//!
//! A `Budget` is a hard ceiling on records accepted by one or more
//! collectors racing on the same logical limit. Check-and-decrement is a
//! single atomic step, so concurrent collectors can never overshoot the
//! cap between the check and the write.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

pub struct Budget {
    remaining: AtomicUsize,
    capacity: usize,
    /// Latched once the ceiling is hit; collection for this type never
    /// resumes within a run, even if capacity appears elsewhere.
    exhausted: AtomicBool,
}

impl Budget {
    pub fn new(capacity: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(capacity),
            capacity,
            exhausted: AtomicBool::new(capacity == 0),
        }
    }

    /// Claims up to `wanted` units, returning how many were granted.
    /// Grants the prefix that fits when fewer than `wanted` remain.
    pub fn take(&self, wanted: usize) -> usize {
        if wanted == 0 {
            return 0;
        }
        let mut granted = 0;
        let _ = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                granted = wanted.min(current);
                Some(current - granted)
            });
        if self.remaining.load(Ordering::Acquire) == 0 {
            self.exhausted.store(true, Ordering::Release);
        }
        granted
    }

    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once the cap has been reached at any point in the run.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    pub fn used(&self) -> usize {
        self.capacity - self.remaining()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_prefix_take() {
        let budget = Budget::new(10);
        assert_eq!(budget.take(7), 7);
        // Only the prefix that fits is granted
        assert_eq!(budget.take(7), 3);
        assert_eq!(budget.take(7), 0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.used(), 10);
    }

    #[test]
    fn test_zero_capacity_starts_exhausted() {
        let budget = Budget::new(0);
        assert!(budget.is_exhausted());
        assert_eq!(budget.take(1), 0);
    }

    #[test]
    fn test_concurrent_take_never_overshoots() {
        let cap = 500;
        let budget = Arc::new(Budget::new(cap));
        let mut handles = Vec::new();

        for _ in 0..8 {
            let budget = budget.clone();
            handles.push(std::thread::spawn(move || {
                let mut granted = 0usize;
                for _ in 0..200 {
                    granted += budget.take(1);
                }
                granted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, cap);
        assert_eq!(budget.remaining(), 0);
        assert!(budget.is_exhausted());
    }

    #[test]
    fn test_concurrent_batched_take_never_overshoots() {
        let cap = 337;
        let budget = Arc::new(Budget::new(cap));
        let mut handles = Vec::new();

        for _ in 0..6 {
            let budget = budget.clone();
            handles.push(std::thread::spawn(move || {
                let mut granted = 0usize;
                for _ in 0..50 {
                    // Page-sized claims race on the same counter
                    granted += budget.take(20);
                }
                granted
            }));
        }

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, cap);
    }
}
