//! Exactly-once result delivery behind `Single` and `Completable`.

use crate::cancel::{Cancellable, CancellationHandle};
use crate::error::FlowError;
use crate::sync::lock;
use crate::terminal::TerminalState;
use std::sync::{Arc, Mutex};

type Deliver<T> = Box<dyn FnOnce(Result<T, FlowError>) + Send>;

/// One relationship: the cancellation handle given to the subscriber plus the
/// write-once terminal deciding which result, if any, is delivered.
pub(crate) struct OutcomeRelay<T> {
    handle: Arc<CancellationHandle>,
    terminal: TerminalState,
    deliver: Arc<Mutex<Option<Deliver<T>>>>,
}

impl<T: Send + 'static> OutcomeRelay<T> {
    pub(crate) fn new<F>(deliver: F) -> Arc<Self>
    where
        F: FnOnce(Result<T, FlowError>) + Send + 'static,
    {
        let deliver: Arc<Mutex<Option<Deliver<T>>>> = Arc::new(Mutex::new(Some(Box::new(deliver))));
        let handle = CancellationHandle::new();
        // Release the subscriber as soon as the relationship is cancelled.
        let slot = Arc::downgrade(&deliver);
        handle.on_cancel(move || {
            if let Some(slot) = slot.upgrade() {
                lock(&slot).take();
            }
        });
        Arc::new(Self {
            handle,
            terminal: TerminalState::new(),
            deliver,
        })
    }

    pub(crate) fn handle(&self) -> Arc<dyn Cancellable> {
        self.handle.clone()
    }

    pub(crate) fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.handle.on_cancel(hook);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }

    /// True once a result was delivered or the subscriber cancelled.
    pub(crate) fn is_done(&self) -> bool {
        self.terminal.is_terminated() || self.handle.is_cancelled()
    }

    pub(crate) fn succeed(&self, value: T) -> bool {
        if self.handle.is_cancelled() || !self.terminal.try_complete() {
            return false;
        }
        self.deliver(Ok(value))
    }

    pub(crate) fn fail(&self, err: FlowError) -> bool {
        if self.handle.is_cancelled() || !self.terminal.try_error() {
            return false;
        }
        self.deliver(Err(err))
    }

    pub(crate) fn settle(&self, outcome: Result<T, FlowError>) -> bool {
        match outcome {
            Ok(value) => self.succeed(value),
            Err(err) => self.fail(err),
        }
    }

    fn deliver(&self, outcome: Result<T, FlowError>) -> bool {
        let deliver = lock(&self.deliver).take();
        match deliver {
            Some(deliver) => {
                deliver(outcome);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting() -> (Arc<OutcomeRelay<u32>>, Arc<AtomicUsize>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let relay = OutcomeRelay::new(move |_result: Result<u32, FlowError>| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        (relay, count)
    }

    #[test]
    fn test_exactly_once() {
        let (relay, count) = counting();
        assert!(relay.succeed(1));
        assert!(!relay.fail(FlowError::msg("late")));
        assert!(!relay.succeed(2));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(relay.is_done());
    }

    #[test]
    fn test_cancel_suppresses() {
        let (relay, count) = counting();
        relay.handle().cancel();
        relay.handle().cancel();
        assert!(!relay.succeed(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(relay.is_cancelled());
    }

    #[test]
    fn test_concurrent_settle_single_winner() {
        for _ in 0..50 {
            let (relay, count) = counting();
            let handles: Vec<_> = (0..4)
                .map(|i| {
                    let relay = relay.clone();
                    std::thread::spawn(move || {
                        if i % 2 == 0 {
                            relay.succeed(i);
                        } else {
                            relay.fail(FlowError::msg("racing"));
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }
}
