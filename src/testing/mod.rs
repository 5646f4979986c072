//! Recording subscribers for tests.
//!
//! Each probe keeps every signal it receives and checks the protocol rules
//! as it goes. A violation does not panic inside the callback (that would
//! unwind through the producer); it is logged and recorded instead, and
//! `assert_no_violations` reports it from the test thread.

mod outcome;
mod subscriber;

pub use outcome::{TestCompletableSubscriber, TestSingleSubscriber};
pub use subscriber::TestSubscriber;

use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Violation log, terminal latch and overlap detection shared by the probes.
struct Monitor {
    violations: Mutex<Vec<String>>,
    in_flight: AtomicBool,
    terminated: Mutex<bool>,
    cond: Condvar,
}

/// Clears the in-flight flag when a callback returns.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Monitor {
    fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
            in_flight: AtomicBool::new(false),
            terminated: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn violation(&self, message: String) {
        tracing::warn!("Protocol violation observed: {}", message);
        lock(&self.violations).push(message);
    }

    fn enter(&self, signal: &str) -> InFlight<'_> {
        if self.in_flight.swap(true, Ordering::AcqRel) {
            self.violation(format!("{signal} overlapped another signal"));
        }
        InFlight(&self.in_flight)
    }

    fn terminate(&self) {
        *lock(&self.terminated) = true;
        self.cond.notify_all();
    }

    fn is_terminated(&self) -> bool {
        *lock(&self.terminated)
    }

    fn await_terminal(&self, timeout: Duration) -> bool {
        let guard = lock(&self.terminated);
        let (guard, _) = self
            .cond
            .wait_timeout_while(guard, timeout, |terminated| !*terminated)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard
    }

    async fn await_terminal_async(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.is_terminated() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    fn violations(&self) -> Vec<String> {
        lock(&self.violations).clone()
    }

    #[track_caller]
    fn assert_clean(&self) {
        let violations = self.violations();
        assert!(violations.is_empty(), "protocol violations: {violations:?}");
    }
}
