use super::Monitor;
use crate::cancel::Cancellable;
use crate::completable::CompletableSubscriber;
use crate::error::FlowError;
use crate::single::SingleSubscriber;
use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Bookkeeping shared by the single and completable probes.
struct OutcomeProbe<T> {
    cancel_on_subscribe: AtomicBool,
    handle: Mutex<Option<Arc<dyn Cancellable>>>,
    log: Mutex<OutcomeLog<T>>,
    monitor: Monitor,
}

struct OutcomeLog<T> {
    values: Vec<T>,
    error: Option<FlowError>,
    subscriptions: usize,
}

impl<T> OutcomeProbe<T> {
    fn new() -> Self {
        Self {
            cancel_on_subscribe: AtomicBool::new(false),
            handle: Mutex::new(None),
            log: Mutex::new(OutcomeLog {
                values: Vec::new(),
                error: None,
                subscriptions: 0,
            }),
            monitor: Monitor::new(),
        }
    }

    fn subscribe(&self, handle: Arc<dyn Cancellable>) {
        let _guard = self.monitor.enter("on_subscribe");
        {
            let mut log = lock(&self.log);
            log.subscriptions += 1;
            if log.subscriptions > 1 {
                drop(log);
                self.monitor
                    .violation("on_subscribe called more than once".to_string());
                handle.cancel();
                return;
            }
        }
        *lock(&self.handle) = Some(handle.clone());
        if self.cancel_on_subscribe.load(Ordering::Acquire) {
            handle.cancel();
        }
    }

    fn settle(&self, outcome: Result<T, FlowError>, signal: &str) {
        let _guard = self.monitor.enter(signal);
        {
            let mut log = lock(&self.log);
            if log.subscriptions == 0 {
                self.monitor
                    .violation(format!("{signal} before on_subscribe"));
            }
            if self.monitor.is_terminated() {
                self.monitor
                    .violation(format!("{signal} after terminal signal"));
                return;
            }
            match outcome {
                Ok(value) => log.values.push(value),
                Err(err) => log.error = Some(err),
            }
        }
        self.monitor.terminate();
    }

    fn cancel(&self) {
        let handle = lock(&self.handle).clone();
        if let Some(handle) = handle {
            handle.cancel();
        }
    }
}

/// Single-result probe; flags a second `on_subscribe`, a result before
/// `on_subscribe`, and more than one result.
pub struct TestSingleSubscriber<T> {
    probe: OutcomeProbe<T>,
}

impl<T: Send + 'static> TestSingleSubscriber<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probe: OutcomeProbe::new(),
        })
    }

    pub fn cancel_on_subscribe(self: Arc<Self>) -> Arc<Self> {
        self.probe.cancel_on_subscribe.store(true, Ordering::Release);
        self
    }

    pub fn cancel(&self) {
        self.probe.cancel();
    }

    pub fn error(&self) -> Option<FlowError> {
        lock(&self.probe.log).error.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        lock(&self.probe.log).subscriptions
    }

    pub fn is_terminated(&self) -> bool {
        self.probe.monitor.is_terminated()
    }

    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.probe.monitor.await_terminal(timeout)
    }

    pub async fn await_terminal_async(&self, timeout: Duration) -> bool {
        self.probe.monitor.await_terminal_async(timeout).await
    }

    pub fn violations(&self) -> Vec<String> {
        self.probe.monitor.violations()
    }

    #[track_caller]
    pub fn assert_no_violations(&self) {
        self.probe.monitor.assert_clean();
    }
}

impl<T: Clone + Send + 'static> TestSingleSubscriber<T> {
    pub fn values(&self) -> Vec<T> {
        lock(&self.probe.log).values.clone()
    }
}

impl<T: Send + 'static> SingleSubscriber<T> for TestSingleSubscriber<T> {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        self.probe.subscribe(handle);
    }

    fn on_success(&self, value: T) {
        self.probe.settle(Ok(value), "on_success");
    }

    fn on_error(&self, error: FlowError) {
        self.probe.settle(Err(error), "on_error");
    }
}

/// Completable probe with the same checks as [`TestSingleSubscriber`].
pub struct TestCompletableSubscriber {
    probe: OutcomeProbe<()>,
}

impl TestCompletableSubscriber {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            probe: OutcomeProbe::new(),
        })
    }

    pub fn cancel_on_subscribe(self: Arc<Self>) -> Arc<Self> {
        self.probe.cancel_on_subscribe.store(true, Ordering::Release);
        self
    }

    pub fn cancel(&self) {
        self.probe.cancel();
    }

    pub fn completions(&self) -> usize {
        lock(&self.probe.log).values.len()
    }

    pub fn error(&self) -> Option<FlowError> {
        lock(&self.probe.log).error.clone()
    }

    pub fn subscribe_count(&self) -> usize {
        lock(&self.probe.log).subscriptions
    }

    pub fn is_terminated(&self) -> bool {
        self.probe.monitor.is_terminated()
    }

    pub fn await_terminal(&self, timeout: Duration) -> bool {
        self.probe.monitor.await_terminal(timeout)
    }

    pub async fn await_terminal_async(&self, timeout: Duration) -> bool {
        self.probe.monitor.await_terminal_async(timeout).await
    }

    pub fn violations(&self) -> Vec<String> {
        self.probe.monitor.violations()
    }

    #[track_caller]
    pub fn assert_no_violations(&self) {
        self.probe.monitor.assert_clean();
    }
}

impl CompletableSubscriber for TestCompletableSubscriber {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        self.probe.subscribe(handle);
    }

    fn on_complete(&self) {
        self.probe.settle(Ok(()), "on_complete");
    }

    fn on_error(&self, error: FlowError) {
        self.probe.settle(Err(error), "on_error");
    }
}
