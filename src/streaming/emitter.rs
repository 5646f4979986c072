//! Push-side publisher: producer threads emit, the drain delivers on demand.
//!
//! Items emitted without outstanding demand wait in a [`Buffer`]; a full
//! buffer applies the configured [`OverflowStrategy`]. Producer-side
//! `complete`/`error` are delivered after the buffered items, except for
//! overflow, which fails the subscription right away.

use crate::cancel::CancellationHandle;
use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::streaming::channel::{Buffer, Offer, OverflowStrategy};
use crate::streaming::subscription::SubscriptionCore;
use crate::sync::lock;
use crate::streaming::{Publisher, Subscriber, Subscription};
use crate::terminal::{Terminal, TerminalState};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

pub(crate) struct EmitterSubscription<T> {
    core: SubscriptionCore<T>,
    buffer: Buffer<T>,
    producer: TerminalState,
    producer_error: Mutex<Option<FlowError>>,
    hooks: CancellationHandle,
}

impl<T: Send + 'static> EmitterSubscription<T> {
    pub(crate) fn new(
        subscriber: Arc<dyn Subscriber<T>>,
        capacity: usize,
        strategy: OverflowStrategy,
    ) -> Arc<Self> {
        Arc::new(Self {
            core: SubscriptionCore::new(subscriber),
            buffer: Buffer::new(capacity, strategy),
            producer: TerminalState::new(),
            producer_error: Mutex::new(None),
            hooks: CancellationHandle::default(),
        })
    }

    /// Deliver `on_subscribe`, then release the gate held since construction.
    pub(crate) fn start(self: &Arc<Self>) {
        self.core.deliver_subscribe(self.clone());
        self.drain(1);
    }

    /// Buffer `item` for delivery. Returns false once the item can never be
    /// delivered: cancelled, terminated, or overflowed.
    pub(crate) fn offer(&self, item: T) -> bool {
        if self.core.is_done() || self.producer.is_terminated() {
            return false;
        }
        let accepted = match self.buffer.offer(item) {
            Offer::Accepted => true,
            Offer::Dropped => {
                tracing::trace!("Buffer full, dropped an item ({:?})", self.buffer.strategy());
                true
            }
            Offer::Overflow => {
                self.overflow();
                false
            }
        };
        self.schedule();
        accepted
    }

    pub(crate) fn complete(&self) {
        if self.producer.try_complete() {
            self.schedule();
        }
    }

    pub(crate) fn error(&self, err: FlowError) {
        {
            let mut slot = lock(&self.producer_error);
            if !self.producer.try_error() {
                return;
            }
            *slot = Some(err);
        }
        self.schedule();
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.core.is_cancelled()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.core.is_done() || self.producer.is_terminated()
    }

    pub(crate) fn requested(&self) -> i64 {
        self.core.demand.get()
    }

    pub(crate) fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.hooks.on_cancel(hook);
    }

    fn overflow(&self) {
        let capacity = self.buffer.capacity();
        tracing::warn!("Buffer overflow (capacity {}), failing subscription", capacity);
        let err = FlowError::Overflow { capacity };
        {
            let mut slot = lock(&self.producer_error);
            if self.producer.try_error() {
                *slot = Some(err.clone());
            }
        }
        self.core.fail_next(err);
        self.hooks.cancel_first();
    }

    fn schedule(&self) {
        if self.core.gate.enter() {
            self.drain(1);
        }
    }

    fn drain(&self, mut missed: usize) {
        loop {
            match self.core.subscriber() {
                Some(subscriber) => self.drain_once(subscriber.as_ref()),
                None => self.buffer.clear(),
            }

            missed = self.core.gate.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    fn drain_once(&self, subscriber: &dyn Subscriber<T>) {
        if self.core.is_cancelled() {
            self.release();
            return;
        }
        if let Some(err) = self.core.take_pending_error() {
            self.buffer.clear();
            self.core.error(err);
            return;
        }

        let requested = self.core.demand.get();
        let mut emitted = 0i64;
        while emitted != requested {
            if self.core.is_cancelled() {
                self.release();
                return;
            }
            let done = self.producer.is_terminated();
            match self.buffer.poll() {
                Some(item) => {
                    subscriber.on_next(item);
                    emitted += 1;
                }
                None if done => {
                    self.finish();
                    return;
                }
                None => break,
            }
        }

        if emitted > 0 {
            tracing::trace!("Drained {} items", emitted);
            self.core.demand.produced(emitted);
        }

        if emitted == requested {
            if self.core.is_cancelled() {
                self.release();
                return;
            }
            let done = self.producer.is_terminated();
            if done && self.buffer.is_empty() {
                self.finish();
            }
        }
    }

    fn finish(&self) {
        match self.producer.get() {
            Terminal::Completed => self.core.complete(),
            Terminal::Errored => {
                let err = lock(&self.producer_error)
                    .take()
                    .unwrap_or_else(|| FlowError::msg("producer failed"));
                self.core.error(err);
            }
            Terminal::Active => {}
        }
    }

    fn release(&self) {
        self.core.release();
        self.buffer.clear();
    }
}

impl<T: Send + 'static> Subscription for EmitterSubscription<T> {
    fn request(&self, n: i64) {
        if self.core.request(n) {
            self.schedule();
        }
    }

    fn cancel(&self) {
        if self.core.cancel() {
            self.hooks.cancel_first();
            self.schedule();
        }
    }
}

/// Producer handle for one subscription. Cheap to clone and safe to use from
/// several threads at once; delivery is still serialized.
pub struct Emitter<T> {
    inner: Arc<EmitterSubscription<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Send + 'static> Emitter<T> {
    /// Queue an item. Returns false once the subscriber is gone or the stream
    /// has terminated; the producer should stop.
    pub fn emit(&self, item: T) -> bool {
        self.inner.offer(item)
    }

    /// Complete after everything already emitted has been delivered.
    pub fn complete(&self) {
        self.inner.complete()
    }

    /// Fail after everything already emitted has been delivered.
    pub fn error(&self, err: FlowError) {
        self.inner.error(err)
    }

    /// Outstanding downstream demand.
    pub fn requested(&self) -> i64 {
        self.inner.requested()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// True once emitting is pointless.
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Run `hook` when the subscriber cancels or the buffer overflows.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.on_cancel(hook)
    }
}

/// Publisher calling a producer function with a fresh [`Emitter`] per
/// subscription.
pub struct EmitterPublisher<T, F> {
    producer: F,
    capacity: usize,
    strategy: OverflowStrategy,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Publisher<T> for EmitterPublisher<T, F>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = EmitterSubscription::new(subscriber, self.capacity, self.strategy);
        inner.start();
        // Cancelled during on_subscribe: never start the producer.
        if inner.is_cancelled() {
            return;
        }
        (self.producer)(Emitter { inner });
    }
}

/// Push publisher with default buffering.
pub fn create<T, F>(producer: F) -> EmitterPublisher<T, F>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) + Send + Sync,
{
    create_with(&FlowConfig::default(), producer)
}

/// Push publisher buffering per `config`.
pub fn create_with<T, F>(config: &FlowConfig, producer: F) -> EmitterPublisher<T, F>
where
    T: Send + 'static,
    F: Fn(Emitter<T>) + Send + Sync,
{
    EmitterPublisher {
        producer,
        capacity: config.buffer_capacity,
        strategy: config.overflow,
        _marker: PhantomData,
    }
}
