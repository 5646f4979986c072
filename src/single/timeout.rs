use crate::cancel::{CancelSlot, Cancellable};
use crate::completable::CompletableSubscriber;
use crate::error::FlowError;
use crate::outcome::OutcomeRelay;
use crate::single::{relay_for, Single, SingleSubscriber};
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;

/// Subscriber that forwards one upstream result into a downstream relay.
///
/// The upstream handle lands in a [`CancelSlot`] so a downstream cancel that
/// races the upstream `on_subscribe` still reaches it.
pub(crate) struct Forward<T, U> {
    relay: Arc<OutcomeRelay<U>>,
    upstream: Arc<CancelSlot>,
    map: MapFn<T, U>,
    timer: Mutex<Option<AbortHandle>>,
}

pub(crate) type MapFn<T, U> = Arc<dyn Fn(T) -> Result<U, FlowError> + Send + Sync>;

pub(crate) fn pass_through<T: 'static>() -> MapFn<T, T> {
    Arc::new(|value: T| -> Result<T, FlowError> { Ok(value) })
}

impl<T, U: Send + 'static> Forward<T, U> {
    pub(crate) fn new(relay: Arc<OutcomeRelay<U>>, map: MapFn<T, U>) -> Arc<Self> {
        let upstream = CancelSlot::new();
        let slot = upstream.clone();
        relay.on_cancel(move || slot.cancel());
        Arc::new(Self {
            relay,
            upstream,
            map,
            timer: Mutex::new(None),
        })
    }

    fn arm(&self, timer: AbortHandle) {
        *lock(&self.timer) = Some(timer);
    }

    fn disarm(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            timer.abort();
        }
    }

    fn succeed(&self, value: T) {
        self.disarm();
        if self.relay.is_done() {
            return;
        }
        self.relay.settle((self.map)(value));
    }

    fn fail(&self, error: FlowError) {
        self.disarm();
        self.relay.fail(error);
    }

    fn attach(&self, handle: Arc<dyn Cancellable>) {
        if !self.upstream.set(handle) && !self.upstream.is_cancelled() {
            tracing::warn!("Rule violation: forwarding subscriber subscribed twice, cancelling");
        }
    }

    /// Fail the relay after `duration`, cancelling the upstream.
    pub(crate) fn start_timer(&self, duration: Duration) -> bool {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            self.relay.fail(FlowError::Rejected(
                "timeout needs a tokio runtime".to_string(),
            ));
            self.upstream.cancel();
            return false;
        };
        let relay = self.relay.clone();
        let upstream = self.upstream.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(duration).await;
            if relay.fail(FlowError::Timeout(duration)) {
                tracing::debug!(?duration, "Timed out waiting for upstream result");
                upstream.cancel();
            }
        });
        let abort = task.abort_handle();
        self.arm(abort.clone());
        self.relay.on_cancel(move || abort.abort());
        true
    }
}

impl<T, U> SingleSubscriber<T> for Forward<T, U>
where
    T: Send,
    U: Send + 'static,
{
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        self.attach(handle);
    }

    fn on_success(&self, value: T) {
        self.succeed(value);
    }

    fn on_error(&self, error: FlowError) {
        self.fail(error);
    }
}

impl CompletableSubscriber for Forward<(), ()> {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        self.attach(handle);
    }

    fn on_complete(&self) {
        self.succeed(());
    }

    fn on_error(&self, error: FlowError) {
        self.fail(error);
    }
}

/// Fails with [`FlowError::Timeout`] if the source does not produce a result
/// in time.
pub struct Timeout<S> {
    source: S,
    duration: Duration,
}

pub fn timeout<S>(source: S, duration: Duration) -> Timeout<S> {
    Timeout { source, duration }
}

impl<T, S> Single<T> for Timeout<S>
where
    T: Send + 'static,
    S: Single<T>,
{
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<T>>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            return;
        }
        let forward = Forward::new(relay, pass_through());
        if forward.start_timer(self.duration) {
            self.source.subscribe(forward);
        }
    }
}
