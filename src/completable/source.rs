use crate::completable::{Completable, CompletableSubscriber};
use crate::error::FlowError;
use crate::outcome::OutcomeRelay;
use crate::single::{pass_through, Forward, MapFn, Single};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

pub(crate) fn relay_for(subscriber: Arc<dyn CompletableSubscriber>) -> Arc<OutcomeRelay<()>> {
    OutcomeRelay::new(move |result| match result {
        Ok(()) => subscriber.on_complete(),
        Err(err) => subscriber.on_error(err),
    })
}

/// Producer handle for one completable subscription.
#[derive(Clone)]
pub struct CompletableEmitter {
    relay: Arc<OutcomeRelay<()>>,
}

impl CompletableEmitter {
    pub fn complete(&self) -> bool {
        self.relay.succeed(())
    }

    pub fn error(&self, err: FlowError) -> bool {
        self.relay.fail(err)
    }

    pub fn settle(&self, result: Result<(), FlowError>) -> bool {
        self.relay.settle(result)
    }

    pub fn is_cancelled(&self) -> bool {
        self.relay.is_cancelled()
    }

    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.relay.on_cancel(hook)
    }
}

pub struct CreateCompletable<F> {
    producer: F,
}

impl<F> Completable for CreateCompletable<F>
where
    F: Fn(CompletableEmitter) + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            tracing::debug!("Completable cancelled during on_subscribe, producer not started");
            return;
        }
        (self.producer)(CompletableEmitter { relay });
    }
}

pub fn create<F>(producer: F) -> CreateCompletable<F>
where
    F: Fn(CompletableEmitter) + Send + Sync,
{
    CreateCompletable { producer }
}

pub fn complete() -> impl Completable {
    create(|emitter: CompletableEmitter| {
        emitter.complete();
    })
}

pub fn failed(err: FlowError) -> impl Completable {
    create(move |emitter: CompletableEmitter| {
        emitter.error(err.clone());
    })
}

/// Runs a future per subscription on the current tokio runtime; cancelling
/// aborts the task.
pub fn from_future<Fut, F>(factory: F) -> impl Completable
where
    Fut: Future<Output = Result<(), FlowError>> + Send + 'static,
    F: Fn() -> Fut + Send + Sync,
{
    create(move |emitter: CompletableEmitter| {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            emitter.error(FlowError::Rejected(
                "future-backed completable needs a tokio runtime".to_string(),
            ));
            return;
        };
        let future = factory();
        let task_emitter = emitter.clone();
        let task = runtime.spawn(async move {
            task_emitter.settle(future.await);
        });
        let abort = task.abort_handle();
        emitter.on_cancel(move || abort.abort());
    })
}

/// Completes when the `Single` succeeds, discarding its value.
pub struct FromSingle<S, T> {
    source: S,
    discard: MapFn<T, ()>,
}

pub fn from_single<S, T>(source: S) -> FromSingle<S, T>
where
    S: Single<T>,
    T: 'static,
{
    FromSingle {
        source,
        discard: Arc::new(|_value: T| -> Result<(), FlowError> { Ok(()) }),
    }
}

impl<S, T> Completable for FromSingle<S, T>
where
    S: Single<T>,
    T: Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            return;
        }
        self.source.subscribe(Forward::new(relay, self.discard.clone()));
    }
}

/// Fails with [`FlowError::Timeout`] if the source does not terminate in time.
pub struct CompletableTimeout<C> {
    source: C,
    duration: Duration,
}

pub fn timeout<C: Completable>(source: C, duration: Duration) -> CompletableTimeout<C> {
    CompletableTimeout { source, duration }
}

impl<C: Completable> Completable for CompletableTimeout<C> {
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            return;
        }
        let forward = Forward::new(relay, pass_through::<()>());
        if forward.start_timer(self.duration) {
            self.source.subscribe(forward);
        }
    }
}
