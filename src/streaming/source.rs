//! Cold publishers over pull sources.
//!
//! Each subscription builds its own [`Source`] lazily: nothing is pulled until
//! the subscriber has requested, and a subscription cancelled during
//! `on_subscribe` never creates its source at all. After delivering a batch the
//! source is pulled one item ahead, so a source that ends exactly when demand
//! runs out still completes.

use crate::error::FlowError;
use crate::streaming::subscription::{finish, SubscriptionCore};
use crate::sync::lock;
use crate::streaming::{Publisher, Subscriber, Subscription};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

/// A synchronous pull source: `None` when exhausted, `Some(Err(_))` on failure.
pub trait Source<T>: Send {
    fn pull(&mut self) -> Option<Result<T, FlowError>>;
}

/// Iterator-backed source.
pub struct IterSource<I>(pub I);

impl<T, I> Source<T> for IterSource<I>
where
    I: Iterator<Item = T> + Send,
{
    fn pull(&mut self) -> Option<Result<T, FlowError>> {
        self.0.next().map(Ok)
    }
}

/// Closure-backed source.
pub struct FnSource<F>(pub F);

impl<T, F> Source<T> for FnSource<F>
where
    F: FnMut() -> Option<Result<T, FlowError>> + Send,
{
    fn pull(&mut self) -> Option<Result<T, FlowError>> {
        (self.0)()
    }
}

/// Publisher creating a fresh source per subscription.
pub struct SourcePublisher<T, F> {
    factory: Arc<F>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S, F> SourcePublisher<T, F>
where
    T: Send + 'static,
    S: Source<T> + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    pub fn new(factory: F) -> Self {
        Self {
            factory: Arc::new(factory),
            _marker: PhantomData,
        }
    }
}

impl<T, S, F> Publisher<T> for SourcePublisher<T, F>
where
    T: Send + 'static,
    S: Source<T> + 'static,
    F: Fn() -> S + Send + Sync + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let factory = self.factory.clone();
        let subscription = Arc::new(SourceSubscription {
            core: SubscriptionCore::new(subscriber),
            factory: Box::new(move || Box::new(factory()) as Box<dyn Source<T>>),
            source: Mutex::new(SourceState::Pending),
        });
        subscription.core.deliver_subscribe(subscription.clone());
        subscription.drain(1);
    }
}

/// Publisher of every item of a cloneable iterable.
pub fn from_iter<I>(items: I) -> impl Publisher<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    SourcePublisher::new(move || IterSource(items.clone().into_iter()))
}

/// Publisher of `count` consecutive integers starting at `start`.
pub fn range(start: u64, count: u64) -> impl Publisher<u64> {
    SourcePublisher::new(move || IterSource(start..start.saturating_add(count)))
}

/// Publisher driven by a per-subscription generator closure.
pub fn generate<T, G, F>(factory: F) -> impl Publisher<T>
where
    T: Send + 'static,
    G: FnMut() -> Option<Result<T, FlowError>> + Send + 'static,
    F: Fn() -> G + Send + Sync + 'static,
{
    SourcePublisher::new(move || FnSource(factory()))
}

/// Publisher that completes immediately.
pub fn empty<T: Send + 'static>() -> impl Publisher<T> {
    Terminated(Ok(()))
}

/// Publisher that fails immediately.
pub fn failed<T: Send + 'static>(err: FlowError) -> impl Publisher<T> {
    Terminated(Err(err))
}

struct Terminated(Result<(), FlowError>);

impl<T> Publisher<T> for Terminated {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        finish(&subscriber, self.0.clone());
    }
}

type SourceFactory<T> = Box<dyn Fn() -> Box<dyn Source<T>> + Send + Sync>;

enum SourceState<T> {
    Pending,
    Active {
        source: Box<dyn Source<T>>,
        peeked: Option<Option<Result<T, FlowError>>>,
    },
    Released,
}

struct SourceSubscription<T> {
    core: SubscriptionCore<T>,
    factory: SourceFactory<T>,
    source: Mutex<SourceState<T>>,
}

impl<T: Send + 'static> SourceSubscription<T> {
    /// Next signal from the source. Only called by the drain owner; the lock
    /// is released before anything is delivered.
    fn pull(&self) -> Option<Result<T, FlowError>> {
        let mut state = lock(&self.source);
        self.activate(&mut state);
        match &mut *state {
            SourceState::Active { source, peeked } => match peeked.take() {
                Some(next) => next,
                None => source.pull(),
            },
            _ => None,
        }
    }

    /// Pull one item past the last delivery so an exhausted source completes
    /// without waiting for more demand.
    fn peek_exhausted(&self) -> Option<Result<(), FlowError>> {
        let mut state = lock(&self.source);
        self.activate(&mut state);
        let SourceState::Active { source, peeked } = &mut *state else {
            return None;
        };
        if peeked.is_none() {
            *peeked = Some(source.pull());
        }
        match peeked {
            Some(None) => Some(Ok(())),
            Some(Some(Err(err))) => Some(Err(err.clone())),
            _ => None,
        }
    }

    /// Build the source on first use, after `on_subscribe` has returned.
    fn activate(&self, state: &mut SourceState<T>) {
        if let SourceState::Pending = *state {
            *state = SourceState::Active {
                source: (self.factory)(),
                peeked: None,
            };
        }
    }

    fn release(&self) {
        self.core.release();
        *lock(&self.source) = SourceState::Released;
    }

    fn drain(&self, mut missed: usize) {
        loop {
            if let Some(subscriber) = self.core.subscriber() {
                self.drain_once(subscriber.as_ref());
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
            self.release_source();
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
            match self.pull() {
                Some(Ok(item)) => {
                    subscriber.on_next(item);
                    emitted += 1;
                }
                Some(Err(err)) => {
                    self.release_source();
                    self.core.error(err);
                    return;
                }
                None => {
                    self.release_source();
                    self.core.complete();
                    return;
                }
            }
        }

        // Without a delivery there is nothing to look past; an exhausted source
        // is then found by the pull of the next request.
        if emitted == 0 {
            return;
        }
        tracing::trace!("Drained {} items", emitted);
        self.core.demand.produced(emitted);

        if self.core.is_cancelled() {
            self.release();
            return;
        }
        match self.peek_exhausted() {
            Some(Ok(())) => {
                self.release_source();
                self.core.complete();
            }
            Some(Err(err)) => {
                self.release_source();
                self.core.error(err);
            }
            None => {}
        }
    }

    fn release_source(&self) {
        *lock(&self.source) = SourceState::Released;
    }
}

impl<T: Send + 'static> Subscription for SourceSubscription<T> {
    fn request(&self, n: i64) {
        if self.core.request(n) && self.core.gate.enter() {
            self.drain(1);
        }
    }

    fn cancel(&self) {
        if self.core.cancel() && self.core.gate.enter() {
            self.drain(1);
        }
    }
}
