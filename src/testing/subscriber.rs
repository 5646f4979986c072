use super::Monitor;
use crate::error::FlowError;
use crate::sync::lock;
use crate::streaming::{Subscriber, Subscription};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Streaming probe.
///
/// Flags a signal before `on_subscribe`, a second `on_subscribe` (whose
/// subscription is cancelled), anything after a terminal signal, more
/// `on_next` calls than were requested, and overlapping callbacks.
pub struct TestSubscriber<T> {
    initial_request: i64,
    replenish: AtomicI64,
    cancel_on_subscribe: AtomicBool,
    subscription: Mutex<Option<Arc<dyn Subscription>>>,
    /// Cumulative demand, bumped before it reaches the publisher.
    requested: AtomicI64,
    log: Mutex<Log<T>>,
    monitor: Monitor,
}

struct Log<T> {
    items: Vec<T>,
    error: Option<FlowError>,
    completions: usize,
    subscribed: bool,
}

impl<T: Send + 'static> TestSubscriber<T> {
    /// `initial_request` is requested from `on_subscribe`; zero requests
    /// nothing.
    pub fn new(initial_request: i64) -> Arc<Self> {
        Arc::new(Self {
            initial_request,
            replenish: AtomicI64::new(0),
            cancel_on_subscribe: AtomicBool::new(false),
            subscription: Mutex::new(None),
            requested: AtomicI64::new(0),
            log: Mutex::new(Log {
                items: Vec::new(),
                error: None,
                completions: 0,
                subscribed: false,
            }),
            monitor: Monitor::new(),
        })
    }

    /// Cancel from inside `on_subscribe` instead of requesting.
    pub fn cancel_on_subscribe(self: Arc<Self>) -> Arc<Self> {
        self.cancel_on_subscribe.store(true, Ordering::Release);
        self
    }

    /// Request `n` more from inside every `on_next`.
    pub fn request_on_next(self: Arc<Self>, n: i64) -> Arc<Self> {
        self.replenish.store(n, Ordering::Release);
        self
    }

    pub fn request(&self, n: i64) {
        if n > 0 {
            let _ = self
                .requested
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |r| {
                    Some(r.saturating_add(n))
                });
        }
        let subscription = lock(&self.subscription).clone();
        if let Some(subscription) = subscription {
            subscription.request(n);
        }
    }

    pub fn cancel(&self) {
        let subscription = lock(&self.subscription).clone();
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// Cumulative positive demand signalled so far.
    pub fn requested(&self) -> i64 {
        self.requested.load(Ordering::Acquire)
    }

    pub fn item_count(&self) -> usize {
        lock(&self.log).items.len()
    }

    pub fn error(&self) -> Option<FlowError> {
        lock(&self.log).error.clone()
    }

    pub fn completions(&self) -> usize {
        lock(&self.log).completions
    }

    pub fn is_subscribed(&self) -> bool {
        lock(&self.log).subscribed
    }

    pub fn is_terminated(&self) -> bool {
        self.monitor.is_terminated()
    }

    /// Block until a terminal signal arrives. Returns false on timeout.
    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.monitor.await_terminal(timeout)
    }

    pub async fn await_terminal_async(&self, timeout: Duration) -> bool {
        self.monitor.await_terminal_async(timeout).await
    }

    pub fn violations(&self) -> Vec<String> {
        self.monitor.violations()
    }

    #[track_caller]
    pub fn assert_no_violations(&self) {
        self.monitor.assert_clean();
    }

    /// Checks shared by every signal after `on_subscribe`.
    fn check_sequence(&self, log: &Log<T>, signal: &str) -> bool {
        if !log.subscribed {
            self.monitor
                .violation(format!("{signal} before on_subscribe"));
        }
        if self.monitor.is_terminated() {
            self.monitor
                .violation(format!("{signal} after terminal signal"));
            return false;
        }
        true
    }
}

impl<T: Clone + Send + 'static> TestSubscriber<T> {
    pub fn items(&self) -> Vec<T> {
        lock(&self.log).items.clone()
    }
}

impl<T: Send + 'static> Subscriber<T> for TestSubscriber<T> {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>) {
        let _guard = self.monitor.enter("on_subscribe");
        {
            let mut log = lock(&self.log);
            if log.subscribed {
                drop(log);
                self.monitor
                    .violation("on_subscribe called more than once".to_string());
                subscription.cancel();
                return;
            }
            log.subscribed = true;
        }
        *lock(&self.subscription) = Some(subscription.clone());

        if self.cancel_on_subscribe.load(Ordering::Acquire) {
            subscription.cancel();
        } else if self.initial_request != 0 {
            self.request(self.initial_request);
        }
    }

    fn on_next(&self, item: T) {
        let _guard = self.monitor.enter("on_next");
        let count = {
            let mut log = lock(&self.log);
            if !self.check_sequence(&log, "on_next") {
                return;
            }
            log.items.push(item);
            log.items.len() as i64
        };
        let requested = self.requested();
        if count > requested {
            self.monitor.violation(format!(
                "on_next #{count} exceeds cumulative demand {requested}"
            ));
        }
        let replenish = self.replenish.load(Ordering::Acquire);
        if replenish > 0 {
            self.request(replenish);
        }
    }

    fn on_error(&self, error: FlowError) {
        let _guard = self.monitor.enter("on_error");
        {
            let mut log = lock(&self.log);
            if !self.check_sequence(&log, "on_error") {
                return;
            }
            log.error = Some(error);
        }
        self.monitor.terminate();
    }

    fn on_complete(&self) {
        let _guard = self.monitor.enter("on_complete");
        {
            let mut log = lock(&self.log);
            if !self.check_sequence(&log, "on_complete") {
                return;
            }
            log.completions += 1;
        }
        self.monitor.terminate();
    }
}
