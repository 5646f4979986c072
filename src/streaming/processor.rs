//! Processors: subscriber upstream, publisher downstream.
//!
//! # Demand policy
//!
//! - [`MapProcessor`] passes demand straight through: one downstream item per
//!   upstream item, so downstream `request(n)` becomes upstream `request(n)`.
//! - [`PublishProcessor`] decouples the two sides. It prefetches from
//!   upstream in batches and replenishes after 75% of a batch has arrived;
//!   each downstream subscriber has its own buffer governed by the configured
//!   `OverflowStrategy`. Items arriving while nobody is subscribed are
//!   dropped.

use crate::config::{replenish_limit, FlowConfig};
use crate::error::FlowError;
use crate::streaming::demand;
use crate::streaming::emitter::EmitterSubscription;
use crate::streaming::subscription::{reject, DeferredSubscription};
use crate::streaming::{Publisher, Subscriber, Subscription};
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Mapper<T, R> = Box<dyn Fn(T) -> Result<R, FlowError> + Send + Sync>;

/// One-to-one transforming processor with exactly one downstream.
///
/// A second subscriber is rejected with `on_subscribe` + `on_error`. A mapper
/// failure cancels upstream and fails the downstream.
pub struct MapProcessor<T, R> {
    mapper: Mapper<T, R>,
    state: Mutex<MapState<R>>,
    deferred: Arc<DeferredSubscription>,
    done: AtomicBool,
}

struct MapState<R> {
    upstream: Option<Arc<dyn Subscription>>,
    downstream: Option<Arc<dyn Subscriber<R>>>,
    /// Downstream `on_subscribe` has returned.
    ready: bool,
    linked: bool,
    /// Upstream terminal that arrived before downstream was ready.
    terminal: Option<Result<(), FlowError>>,
}

impl<T, R> MapProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        Self::try_new(move |item| Ok(f(item)))
    }

    pub fn try_new<F>(f: F) -> Self
    where
        F: Fn(T) -> Result<R, FlowError> + Send + Sync + 'static,
    {
        Self {
            mapper: Box::new(f),
            state: Mutex::new(MapState {
                upstream: None,
                downstream: None,
                ready: false,
                linked: false,
                terminal: None,
            }),
            deferred: DeferredSubscription::new(),
            done: AtomicBool::new(false),
        }
    }

    fn downstream(&self) -> Option<Arc<dyn Subscriber<R>>> {
        lock(&self.state).downstream.clone()
    }

    fn terminate(&self, outcome: Result<(), FlowError>) {
        if self.done.swap(true, Ordering::AcqRel) {
            return;
        }
        let downstream = {
            let mut state = lock(&self.state);
            if !state.ready {
                state.terminal = Some(outcome);
                return;
            }
            state.downstream.take()
        };
        if let Some(downstream) = downstream {
            match outcome {
                Ok(()) => downstream.on_complete(),
                Err(err) => downstream.on_error(err),
            }
        }
    }
}

impl<T, R> Subscriber<T> for MapProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let link = {
            let mut state = lock(&self.state);
            if state.upstream.is_some() || self.done.load(Ordering::Acquire) {
                drop(state);
                tracing::warn!("Rule violation: processor subscribed twice, cancelling");
                subscription.cancel();
                return;
            }
            state.upstream = Some(subscription.clone());
            let link = state.ready && !state.linked;
            state.linked |= link;
            link
        };
        if link {
            self.deferred.link(subscription);
        }
    }

    fn on_next(&self, item: T) {
        if self.done.load(Ordering::Acquire) {
            return;
        }
        let Some(downstream) = self.downstream() else {
            return;
        };
        match (self.mapper)(item) {
            Ok(mapped) => downstream.on_next(mapped),
            Err(err) => {
                self.deferred.cancel();
                self.terminate(Err(err));
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.terminate(Err(error));
    }

    fn on_complete(&self) {
        self.terminate(Ok(()));
    }
}

impl<T, R> Publisher<R> for MapProcessor<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<R>>) {
        {
            let mut state = lock(&self.state);
            if state.downstream.is_some() || state.ready {
                drop(state);
                reject(&subscriber, "MapProcessor allows only one subscriber");
                return;
            }
            state.downstream = Some(subscriber.clone());
        }

        subscriber.on_subscribe(self.deferred.clone());

        let (terminal, upstream) = {
            let mut state = lock(&self.state);
            state.ready = true;
            let terminal = state.terminal.take();
            if terminal.is_some() {
                state.downstream = None;
            }
            let upstream = match &state.upstream {
                Some(upstream) if !state.linked && terminal.is_none() => Some(upstream.clone()),
                _ => None,
            };
            state.linked |= upstream.is_some();
            (terminal, upstream)
        };

        match (terminal, upstream) {
            (Some(Ok(())), _) => subscriber.on_complete(),
            (Some(Err(err)), _) => subscriber.on_error(err),
            (None, Some(upstream)) => {
                self.deferred.link(upstream);
            }
            (None, None) => {}
        }
    }
}

/// Multicast processor with per-subscriber buffering.
///
/// Late subscribers only see items published after they subscribed; once the
/// upstream has terminated they receive the terminal signal immediately.
pub struct PublishProcessor<T> {
    prefetch: usize,
    limit: usize,
    capacity: usize,
    strategy: crate::streaming::OverflowStrategy,
    upstream: Mutex<Option<Arc<dyn Subscription>>>,
    state: Mutex<PublishState<T>>,
    received: AtomicUsize,
}

struct PublishState<T> {
    subscribers: Vec<Arc<EmitterSubscription<T>>>,
    terminal: Option<Result<(), FlowError>>,
}

impl<T> PublishProcessor<T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::with_config(&FlowConfig::default())
    }

    pub fn with_config(config: &FlowConfig) -> Self {
        Self {
            prefetch: config.prefetch,
            limit: replenish_limit(config.prefetch),
            capacity: config.buffer_capacity,
            strategy: config.overflow,
            upstream: Mutex::new(None),
            state: Mutex::new(PublishState {
                subscribers: Vec::new(),
                terminal: None,
            }),
            received: AtomicUsize::new(0),
        }
    }

    /// Live downstream subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.state)
            .subscribers
            .iter()
            .filter(|s| !s.is_finished())
            .count()
    }

    pub fn is_terminated(&self) -> bool {
        lock(&self.state).terminal.is_some()
    }

    /// Cancel the upstream subscription. Downstream subscribers stay open
    /// until the processor is terminated.
    pub fn cancel_upstream(&self) {
        let upstream = lock(&self.upstream).take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    fn terminate(&self, outcome: Result<(), FlowError>) {
        let subscribers = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                return;
            }
            state.terminal = Some(outcome.clone());
            std::mem::take(&mut state.subscribers)
        };
        lock(&self.upstream).take();
        tracing::debug!(
            "PublishProcessor terminated, notifying {} subscribers",
            subscribers.len()
        );
        for subscriber in subscribers {
            match &outcome {
                Ok(()) => subscriber.complete(),
                Err(err) => subscriber.error(err.clone()),
            }
        }
    }
}

impl<T> Default for PublishProcessor<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Subscriber<T> for PublishProcessor<T>
where
    T: Clone + Send + 'static,
{
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        {
            let mut upstream = lock(&self.upstream);
            if upstream.is_some() || self.is_terminated() {
                drop(upstream);
                tracing::warn!("Rule violation: processor subscribed twice, cancelling");
                subscription.cancel();
                return;
            }
            *upstream = Some(subscription.clone());
        }
        subscription.request(demand::from_count(self.prefetch));
    }

    fn on_next(&self, item: T) {
        let subscribers = {
            let mut state = lock(&self.state);
            if state.terminal.is_some() {
                return;
            }
            state.subscribers.retain(|s| !s.is_finished());
            state.subscribers.clone()
        };
        for subscriber in &subscribers {
            subscriber.offer(item.clone());
        }

        let received = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        if received == self.limit {
            self.received.store(0, Ordering::Relaxed);
            let upstream = lock(&self.upstream).clone();
            if let Some(upstream) = upstream {
                upstream.request(demand::from_count(self.limit));
            }
        }
    }

    fn on_error(&self, error: FlowError) {
        self.terminate(Err(error));
    }

    fn on_complete(&self) {
        self.terminate(Ok(()));
    }
}

impl<T> Publisher<T> for PublishProcessor<T>
where
    T: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        let inner = EmitterSubscription::new(subscriber, self.capacity, self.strategy);
        let terminal = {
            let mut state = lock(&self.state);
            match &state.terminal {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    state.subscribers.push(inner.clone());
                    None
                }
            }
        };
        inner.start();
        match terminal {
            Some(Ok(())) => inner.complete(),
            Some(Err(err)) => inner.error(err),
            None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{range, OverflowStrategy};
    use crate::testing::TestSubscriber;

    #[test]
    fn test_map_passes_demand_through() {
        let processor = Arc::new(MapProcessor::new(|n: u64| n * 10));
        let probe = TestSubscriber::new(0);
        processor.subscribe(probe.clone());
        range(1, 5).subscribe(processor.clone());

        probe.request(2);
        assert_eq!(probe.items(), vec![10, 20]);
        probe.request(10);
        assert_eq!(probe.items(), vec![10, 20, 30, 40, 50]);
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
    }

    #[test]
    fn test_map_upstream_first() {
        let processor = Arc::new(MapProcessor::new(|n: u64| n + 1));
        range(0, 3).subscribe(processor.clone());
        let probe = TestSubscriber::new(3);
        processor.subscribe(probe.clone());

        assert_eq!(probe.items(), vec![1, 2, 3]);
        assert_eq!(probe.completions(), 1);
        probe.assert_no_violations();
    }

    #[test]
    fn test_map_rejects_second_subscriber() {
        let processor = MapProcessor::new(|n: u64| n);
        let first = TestSubscriber::new(0);
        let second = TestSubscriber::new(0);
        processor.subscribe(first.clone());
        processor.subscribe(second.clone());

        assert!(matches!(second.error(), Some(FlowError::Rejected(_))));
        assert!(first.error().is_none());
        second.assert_no_violations();
    }

    #[test]
    fn test_map_failure_cancels_upstream() {
        let processor = Arc::new(MapProcessor::try_new(|n: u64| {
            if n == 2 {
                Err(FlowError::msg("bad item"))
            } else {
                Ok(n)
            }
        }));
        let probe = TestSubscriber::new(10);
        processor.subscribe(probe.clone());
        range(0, 100).subscribe(processor.clone());

        assert_eq!(probe.items(), vec![0, 1]);
        assert!(probe.error().is_some());
        probe.assert_no_violations();
    }

    #[test]
    fn test_map_forwards_illegal_request() {
        let processor = Arc::new(MapProcessor::new(|n: u64| n));
        let probe = TestSubscriber::new(0);
        processor.subscribe(probe.clone());
        range(0, 3).subscribe(processor.clone());

        probe.request(-1);
        assert!(matches!(probe.error(), Some(FlowError::IllegalRequest(-1))));
        assert!(probe.items().is_empty());
    }

    #[test]
    fn test_publish_multicasts() {
        let processor = Arc::new(PublishProcessor::<u64>::new());
        let a = TestSubscriber::new(10);
        let b = TestSubscriber::new(10);
        processor.subscribe(a.clone());
        processor.subscribe(b.clone());
        range(0, 4).subscribe(processor.clone());

        assert_eq!(a.items(), vec![0, 1, 2, 3]);
        assert_eq!(b.items(), vec![0, 1, 2, 3]);
        assert_eq!(a.completions(), 1);
        assert_eq!(b.completions(), 1);
        a.assert_no_violations();
        b.assert_no_violations();
    }

    #[test]
    fn test_publish_respects_downstream_demand() {
        let config = FlowConfig {
            prefetch: 4,
            buffer_capacity: 64,
            ..FlowConfig::default()
        };
        let processor = Arc::new(PublishProcessor::<u64>::with_config(&config));
        let slow = TestSubscriber::new(1);
        processor.subscribe(slow.clone());
        range(0, 20).subscribe(processor.clone());

        assert_eq!(slow.items(), vec![0]);
        slow.request(3);
        assert_eq!(slow.items(), vec![0, 1, 2, 3]);
        slow.request(100);
        assert_eq!(slow.item_count(), 20);
        assert_eq!(slow.completions(), 1);
        slow.assert_no_violations();
    }

    #[test]
    fn test_publish_overflow_isolated_per_subscriber() {
        let config = FlowConfig {
            prefetch: 8,
            buffer_capacity: 2,
            overflow: OverflowStrategy::Error,
            ..FlowConfig::default()
        };
        let processor = Arc::new(PublishProcessor::<u64>::with_config(&config));
        let fast = TestSubscriber::new(100);
        let slow = TestSubscriber::new(0);
        processor.subscribe(fast.clone());
        processor.subscribe(slow.clone());
        range(0, 5).subscribe(processor.clone());

        assert_eq!(fast.item_count(), 5);
        assert_eq!(fast.completions(), 1);
        assert!(matches!(slow.error(), Some(FlowError::Overflow { capacity: 2 })));
    }

    #[test]
    fn test_publish_late_subscriber_gets_terminal() {
        let processor = Arc::new(PublishProcessor::<u64>::new());
        range(0, 2).subscribe(processor.clone());
        assert!(processor.is_terminated());

        let late = TestSubscriber::new(0);
        processor.subscribe(late.clone());
        assert!(late.items().is_empty());
        assert_eq!(late.completions(), 1);
        late.assert_no_violations();
    }

    #[test]
    fn test_publish_as_hot_subject() {
        let processor = PublishProcessor::<&str>::new();
        let probe = TestSubscriber::new(5);
        processor.subscribe(probe.clone());
        processor.on_next("a");
        probe.cancel();
        processor.on_next("b");
        assert_eq!(probe.items(), vec!["a"]);
        assert_eq!(processor.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_huge_prefetch_is_unbounded_demand() {
        let config = FlowConfig {
            prefetch: usize::MAX,
            ..FlowConfig::default()
        };
        let processor = Arc::new(PublishProcessor::<u64>::with_config(&config));
        let probe = TestSubscriber::new(crate::streaming::UNBOUNDED);
        processor.subscribe(probe.clone());
        range(0, 5).subscribe(processor.clone());

        assert_eq!(probe.items(), vec![0, 1, 2, 3, 4]);
        assert_eq!(probe.completions(), 1);
        assert!(probe.error().is_none());
        probe.assert_no_violations();
    }
}
