//! Demand accounting for one subscription.
//!
//! Demand is the number of `on_next` signals the subscriber has asked for and
//! not yet received. It saturates at [`UNBOUNDED`]; once there, delivering
//! items no longer decrements it.

use crate::error::FlowError;
use std::sync::atomic::{AtomicI64, Ordering};

/// "Effectively unbounded" demand.
pub const UNBOUNDED: i64 = i64::MAX;

/// Saturating add of two non-negative demands.
pub fn add_cap(a: i64, b: i64) -> i64 {
    a.saturating_add(b).min(UNBOUNDED)
}

/// Demand for a `usize` count such as a prefetch size, capped at [`UNBOUNDED`].
pub fn from_count(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(UNBOUNDED)
}

/// Check a `request(n)` argument.
pub fn validate(n: i64) -> Result<(), FlowError> {
    if n <= 0 {
        Err(FlowError::IllegalRequest(n))
    } else {
        Ok(())
    }
}

/// Atomic outstanding-demand counter.
#[derive(Debug, Default)]
pub struct Demand {
    value: AtomicI64,
}

impl Demand {
    pub const fn new() -> Self {
        Self {
            value: AtomicI64::new(0),
        }
    }

    /// Add `n` (> 0) saturating at [`UNBOUNDED`]. Returns the previous value.
    pub fn add(&self, n: i64) -> i64 {
        debug_assert!(n > 0);
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = add_cap(current, n);
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(prev) => return prev,
                Err(actual) => current = actual,
            }
        }
    }

    /// Account for `n` delivered items. Returns the remaining demand.
    ///
    /// Unbounded demand stays unbounded. Callers never deliver more than they
    /// read from [`Demand::get`], so the value cannot go negative.
    pub fn produced(&self, n: i64) -> i64 {
        let mut current = self.value.load(Ordering::Acquire);
        loop {
            if current == UNBOUNDED {
                return UNBOUNDED;
            }
            let next = current - n;
            debug_assert!(next >= 0, "produced more than requested");
            match self.value.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}
