//! Work-in-progress gate for the single-owner drain loop.
//!
//! Every thread that adds demand, enqueues an item or cancels calls
//! [`DrainGate::enter`]. Exactly one caller wins and runs the drain; the others
//! only bump the counter so the owner loops once more before leaving.
//!
//! ```ignore
//! if !gate.enter() {
//!     return;
//! }
//! let mut missed = 1;
//! loop {
//!     // deliver what demand allows
//!     missed = gate.leave(missed);
//!     if missed == 0 {
//!         break;
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct DrainGate {
    wip: AtomicUsize,
}

impl DrainGate {
    pub const fn new() -> Self {
        Self {
            wip: AtomicUsize::new(0),
        }
    }

    /// Signal new work. Returns true if the caller now owns the drain.
    pub fn enter(&self) -> bool {
        self.wip.fetch_add(1, Ordering::AcqRel) == 0
    }

    /// Give back `missed` units of observed work. Returns the work that
    /// arrived meanwhile; zero means the drain was released.
    pub fn leave(&self, missed: usize) -> usize {
        self.wip.fetch_sub(missed, Ordering::AcqRel) - missed
    }
}
