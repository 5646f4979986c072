//! Per-subscription state shared by the streaming producers.

use crate::error::FlowError;
use crate::streaming::demand::{self, Demand};
use crate::streaming::drain::DrainGate;
use crate::streaming::{Subscriber, Subscription};
use crate::terminal::TerminalState;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::sync::lock;
use std::sync::{Arc, Mutex};

/// Demand, cancellation and terminal bookkeeping for one subscriber.
///
/// Signals are only delivered by whoever owns `gate`. The gate starts held so
/// nothing reaches the subscriber before `on_subscribe` has returned.
pub(crate) struct SubscriptionCore<T> {
    subscriber: Mutex<Option<Arc<dyn Subscriber<T>>>>,
    pub(crate) demand: Demand,
    pub(crate) gate: DrainGate,
    cancelled: AtomicBool,
    terminal: TerminalState,
    pending_error: Mutex<Option<FlowError>>,
}

impl<T> SubscriptionCore<T> {
    pub(crate) fn new(subscriber: Arc<dyn Subscriber<T>>) -> Self {
        let gate = DrainGate::new();
        gate.enter();
        Self {
            subscriber: Mutex::new(Some(subscriber)),
            demand: Demand::new(),
            gate,
            cancelled: AtomicBool::new(false),
            terminal: TerminalState::new(),
            pending_error: Mutex::new(None),
        }
    }

    /// Deliver `on_subscribe`. The caller then runs its drain with `missed = 1`.
    pub(crate) fn deliver_subscribe(&self, subscription: Arc<dyn Subscription>) {
        if let Some(subscriber) = self.subscriber() {
            subscriber.on_subscribe(subscription);
        }
    }

    pub(crate) fn subscriber(&self) -> Option<Arc<dyn Subscriber<T>>> {
        lock(&self.subscriber).clone()
    }

    /// Record a `request(n)`. Returns true if the caller should drain.
    pub(crate) fn request(&self, n: i64) -> bool {
        if self.is_done() {
            return false;
        }
        if let Err(err) = demand::validate(n) {
            tracing::warn!("Rule violation: request({}) is not positive", n);
            self.fail_next(err);
            return true;
        }
        self.demand.add(n);
        true
    }

    /// Returns true for the first cancel.
    pub(crate) fn cancel(&self) -> bool {
        let first = !self.cancelled.swap(true, Ordering::AcqRel);
        if first {
            tracing::debug!("Subscription cancelled");
        }
        first
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub(crate) fn is_done(&self) -> bool {
        self.is_cancelled() || self.terminal.is_terminated()
    }

    /// Queue an error the next drain delivers ahead of any buffered items.
    /// The first queued error wins.
    pub(crate) fn fail_next(&self, err: FlowError) {
        let mut pending = lock(&self.pending_error);
        if pending.is_none() {
            *pending = Some(err);
        }
    }

    pub(crate) fn take_pending_error(&self) -> Option<FlowError> {
        lock(&self.pending_error).take()
    }

    /// Drop the subscriber reference; no further signals are possible.
    pub(crate) fn release(&self) {
        lock(&self.subscriber).take();
    }

    pub(crate) fn complete(&self) {
        if !self.terminal.try_complete() {
            return;
        }
        let subscriber = lock(&self.subscriber).take();
        if let Some(subscriber) = subscriber {
            tracing::debug!("Subscription completed");
            subscriber.on_complete();
        }
    }

    pub(crate) fn error(&self, err: FlowError) {
        if !self.terminal.try_error() {
            return;
        }
        let subscriber = lock(&self.subscriber).take();
        if let Some(subscriber) = subscriber {
            tracing::debug!("Subscription failed: {}", err);
            subscriber.on_error(err);
        }
    }
}

/// Subscription that ignores everything; handed out before an immediate
/// terminal signal.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: i64) {}

    fn cancel(&self) {}
}

/// Refuse `subscriber`: `on_subscribe` followed immediately by `on_error`.
pub fn reject<T>(subscriber: &Arc<dyn Subscriber<T>>, reason: impl Into<String>) {
    let reason = reason.into();
    tracing::warn!("Rejecting subscriber: {}", reason);
    subscriber.on_subscribe(Arc::new(EmptySubscription));
    subscriber.on_error(FlowError::Rejected(reason));
}

/// Immediate terminal with no elements: `on_subscribe` then the outcome.
pub(crate) fn finish<T>(subscriber: &Arc<dyn Subscriber<T>>, outcome: Result<(), FlowError>) {
    subscriber.on_subscribe(Arc::new(EmptySubscription));
    match outcome {
        Ok(()) => subscriber.on_complete(),
        Err(err) => subscriber.on_error(err),
    }
}

/// Stand-in handed downstream before the real upstream subscription exists.
///
/// Demand and cancellation are accumulated and replayed once on [`link`].
/// A non-positive request is forwarded as-is so the upstream reports it.
///
/// [`link`]: DeferredSubscription::link
#[derive(Default)]
pub struct DeferredSubscription {
    state: Mutex<Deferred>,
}

#[derive(Default)]
struct Deferred {
    upstream: Option<Arc<dyn Subscription>>,
    pending: i64,
    illegal: Option<i64>,
    cancelled: bool,
}

impl DeferredSubscription {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach the upstream. Returns false (and cancels `upstream`) if already
    /// linked or cancelled.
    pub fn link(&self, upstream: Arc<dyn Subscription>) -> bool {
        let (pending, illegal) = {
            let mut state = lock(&self.state);
            if state.upstream.is_some() || state.cancelled {
                drop(state);
                upstream.cancel();
                return false;
            }
            state.upstream = Some(upstream.clone());
            (
                std::mem::take(&mut state.pending),
                state.illegal.take(),
            )
        };
        if let Some(n) = illegal {
            upstream.request(n);
        } else if pending > 0 {
            upstream.request(pending);
        }
        true
    }

    pub fn is_cancelled(&self) -> bool {
        lock(&self.state).cancelled
    }
}

impl Subscription for DeferredSubscription {
    fn request(&self, n: i64) {
        let upstream = {
            let mut state = lock(&self.state);
            if state.cancelled {
                return;
            }
            if let Some(upstream) = state.upstream.clone() {
                upstream
            } else {
                if n <= 0 {
                    state.illegal.get_or_insert(n);
                } else {
                    state.pending = demand::add_cap(state.pending, n);
                }
                return;
            }
        };
        upstream.request(n);
    }

    fn cancel(&self) {
        let upstream = {
            let mut state = lock(&self.state);
            if state.cancelled {
                return;
            }
            state.cancelled = true;
            state.upstream.take()
        };
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }
}
