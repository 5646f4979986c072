//! Bridges between publishers and `futures::Stream`.
//!
//! [`into_stream`] turns poll credit into demand: it requests `prefetch`
//! items up front and asks for more only as the consumer drains them, so the
//! bridge never holds more than `prefetch` items. [`from_stream`] runs a
//! stream on a tokio task that only polls while the subscriber has demand.

use crate::config::replenish_limit;
use crate::error::FlowError;
use crate::streaming::demand::{self, Demand};
use crate::streaming::subscription::reject;
use crate::streaming::{Publisher, Subscriber, Subscription};
use crate::sync::lock;
use futures::{Stream, StreamExt};
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, Notify};

enum Signal<T> {
    Next(T),
    Error(FlowError),
    Complete,
}

struct BridgeSubscriber<T> {
    tx: mpsc::UnboundedSender<Signal<T>>,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    cancelled: AtomicBool,
    prefetch: i64,
}

impl<T: Send + 'static> Subscriber<T> for BridgeSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        {
            let mut slot = lock(&self.subscription);
            if slot.is_some() || self.cancelled.load(Ordering::Acquire) {
                drop(slot);
                subscription.cancel();
                return;
            }
            *slot = Some(subscription.clone());
        }
        subscription.request(self.prefetch);
    }

    fn on_next(&self, item: T) {
        let _ = self.tx.send(Signal::Next(item));
    }

    fn on_error(&self, error: FlowError) {
        let _ = self.tx.send(Signal::Error(error));
    }

    fn on_complete(&self) {
        let _ = self.tx.send(Signal::Complete);
    }
}

impl<T> BridgeSubscriber<T> {
    fn subscription(&self) -> Option<Arc<dyn Subscription>> {
        lock(&self.subscription).clone()
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        let subscription = lock(&self.subscription).take();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }
}

/// `futures::Stream` view of a publisher. Dropping it cancels the
/// subscription.
pub struct PublisherStream<T> {
    bridge: Arc<BridgeSubscriber<T>>,
    rx: mpsc::UnboundedReceiver<Signal<T>>,
    consumed: usize,
    limit: usize,
    done: bool,
}

/// Subscribe to `publisher` and expose it as a stream of results.
pub fn into_stream<T, P>(publisher: &P, prefetch: usize) -> PublisherStream<T>
where
    T: Send + 'static,
    P: Publisher<T> + ?Sized,
{
    let prefetch = prefetch.max(1);
    let (tx, rx) = mpsc::unbounded_channel();
    let bridge = Arc::new(BridgeSubscriber {
        tx,
        subscription: Mutex::new(None),
        cancelled: AtomicBool::new(false),
        prefetch: demand::from_count(prefetch),
    });
    publisher.subscribe(bridge.clone());
    PublisherStream {
        bridge,
        rx,
        consumed: 0,
        limit: replenish_limit(prefetch),
        done: false,
    }
}

impl<T: Send + 'static> Stream for PublisherStream<T> {
    type Item = Result<T, FlowError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(Signal::Next(item))) => {
                self.consumed += 1;
                if self.consumed == self.limit {
                    self.consumed = 0;
                    if let Some(subscription) = self.bridge.subscription() {
                        subscription.request(demand::from_count(self.limit));
                    }
                }
                Poll::Ready(Some(Ok(item)))
            }
            Poll::Ready(Some(Signal::Error(err))) => {
                self.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                self.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for PublisherStream<T> {
    fn drop(&mut self) {
        if !self.done {
            self.bridge.cancel();
        }
    }
}

/// Publisher running a fresh stream per subscription on the current tokio
/// runtime. Subscribing outside a runtime is rejected.
pub struct StreamPublisher<T, F> {
    factory: F,
    _marker: PhantomData<fn() -> T>,
}

/// Publisher over streams built by `factory`.
pub fn from_stream<T, S, F>(factory: F) -> StreamPublisher<T, F>
where
    T: Send + 'static,
    S: Stream<Item = Result<T, FlowError>> + Send + 'static,
    F: Fn() -> S + Send + Sync,
{
    StreamPublisher {
        factory,
        _marker: PhantomData,
    }
}

struct StreamSubscription {
    demand: Demand,
    illegal: Mutex<Option<FlowError>>,
    cancelled: AtomicBool,
    wakeup: Notify,
    task: Mutex<Option<tokio::task::AbortHandle>>,
}

impl Subscription for StreamSubscription {
    fn request(&self, n: i64) {
        if self.cancelled.load(Ordering::Acquire) {
            return;
        }
        if let Err(err) = demand::validate(n) {
            tracing::warn!("Rule violation: request({}) is not positive", n);
            lock(&self.illegal).get_or_insert(err);
        } else {
            self.demand.add(n);
        }
        self.wakeup.notify_one();
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Stream subscription cancelled");
        if let Some(task) = lock(&self.task).take() {
            task.abort();
        }
        self.wakeup.notify_one();
    }
}

impl<T, S, F> Publisher<T> for StreamPublisher<T, F>
where
    T: Send + 'static,
    S: Stream<Item = Result<T, FlowError>> + Send + 'static,
    F: Fn() -> S + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            reject(&subscriber, "stream publisher needs a tokio runtime");
            return;
        };

        let subscription = Arc::new(StreamSubscription {
            demand: Demand::new(),
            illegal: Mutex::new(None),
            cancelled: AtomicBool::new(false),
            wakeup: Notify::new(),
            task: Mutex::new(None),
        });
        subscriber.on_subscribe(subscription.clone());
        if subscription.cancelled.load(Ordering::Acquire) {
            return;
        }

        let stream = (self.factory)();
        let handle = runtime.spawn(pump(stream, subscriber, subscription.clone()));
        *lock(&subscription.task) = Some(handle.abort_handle());
        // A cancel that raced the spawn found no task to abort.
        if subscription.cancelled.load(Ordering::Acquire) {
            handle.abort();
        }
    }
}

/// Deliver stream items while there is demand. All signals for the
/// subscription come from this one task.
async fn pump<T, S>(
    stream: S,
    subscriber: Arc<dyn Subscriber<T>>,
    subscription: Arc<StreamSubscription>,
) where
    T: Send + 'static,
    S: Stream<Item = Result<T, FlowError>> + Send + 'static,
{
    let mut stream = std::pin::pin!(stream);
    loop {
        if subscription.cancelled.load(Ordering::Acquire) {
            return;
        }
        // Bind first: the subscriber may call `request` from `on_error`.
        let illegal = lock(&subscription.illegal).take();
        if let Some(err) = illegal {
            subscriber.on_error(err);
            return;
        }
        if subscription.demand.get() == 0 {
            subscription.wakeup.notified().await;
            continue;
        }

        let next = tokio::select! {
            biased;
            _ = subscription.wakeup.notified() => continue,
            next = stream.next() => next,
        };
        if subscription.cancelled.load(Ordering::Acquire) {
            return;
        }
        match next {
            Some(Ok(item)) => {
                subscriber.on_next(item);
                subscription.demand.produced(1);
            }
            Some(Err(err)) => {
                subscriber.on_error(err);
                return;
            }
            None => {
                subscriber.on_complete();
                return;
            }
        }
    }
}
