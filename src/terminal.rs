//! Write-once terminal state shared by all three protocol families.

use std::sync::atomic::{AtomicU8, Ordering};

const ACTIVE: u8 = 0;
const COMPLETED: u8 = 1;
const ERRORED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    Active,
    Completed,
    Errored,
}

/// Tri-state {active, completed, errored}; only the first transition wins.
#[derive(Debug, Default)]
pub struct TerminalState {
    state: AtomicU8,
}

impl TerminalState {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(ACTIVE),
        }
    }

    /// Returns true if this call moved the state to `Completed`.
    pub fn try_complete(&self) -> bool {
        self.transition(COMPLETED)
    }

    /// Returns true if this call moved the state to `Errored`.
    pub fn try_error(&self) -> bool {
        self.transition(ERRORED)
    }

    fn transition(&self, to: u8) -> bool {
        self.state
            .compare_exchange(ACTIVE, to, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn get(&self) -> Terminal {
        match self.state.load(Ordering::Acquire) {
            ACTIVE => Terminal::Active,
            COMPLETED => Terminal::Completed,
            _ => Terminal::Errored,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state.load(Ordering::Acquire) != ACTIVE
    }
}
