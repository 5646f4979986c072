use crate::error::FlowError;
use crate::outcome::OutcomeRelay;
use crate::single::{Single, SingleSubscriber};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Relay delivering to a single subscriber.
pub(crate) fn relay_for<T: Send + 'static>(
    subscriber: Arc<dyn SingleSubscriber<T>>,
) -> Arc<OutcomeRelay<T>> {
    OutcomeRelay::new(move |result| match result {
        Ok(value) => subscriber.on_success(value),
        Err(err) => subscriber.on_error(err),
    })
}

/// Producer handle for one subscription. The first of `success`/`error`
/// wins; later calls and calls after cancellation return false.
pub struct SingleEmitter<T> {
    relay: Arc<OutcomeRelay<T>>,
}

impl<T> Clone for SingleEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            relay: self.relay.clone(),
        }
    }
}

impl<T: Send + 'static> SingleEmitter<T> {
    pub fn success(&self, value: T) -> bool {
        self.relay.succeed(value)
    }

    pub fn error(&self, err: FlowError) -> bool {
        self.relay.fail(err)
    }

    pub fn settle(&self, result: Result<T, FlowError>) -> bool {
        self.relay.settle(result)
    }

    pub fn is_cancelled(&self) -> bool {
        self.relay.is_cancelled()
    }

    /// Run `hook` if the subscriber cancels.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.relay.on_cancel(hook)
    }
}

/// `Single` calling a producer function per subscription.
pub struct CreateSingle<T, F> {
    producer: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> Single<T> for CreateSingle<T, F>
where
    T: Send + 'static,
    F: Fn(SingleEmitter<T>) + Send + Sync,
{
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<T>>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            tracing::debug!("Single cancelled during on_subscribe, producer not started");
            return;
        }
        (self.producer)(SingleEmitter { relay });
    }
}

pub fn create<T, F>(producer: F) -> CreateSingle<T, F>
where
    T: Send + 'static,
    F: Fn(SingleEmitter<T>) + Send + Sync,
{
    CreateSingle {
        producer,
        _marker: PhantomData,
    }
}

/// Succeeds with a clone of `value`.
pub fn just<T>(value: T) -> impl Single<T>
where
    T: Clone + Send + Sync + 'static,
{
    create(move |emitter: SingleEmitter<T>| {
        emitter.success(value.clone());
    })
}

/// Fails with a clone of `err`.
pub fn failed<T: Send + 'static>(err: FlowError) -> impl Single<T> {
    create(move |emitter: SingleEmitter<T>| {
        emitter.error(err.clone());
    })
}

/// Runs a future per subscription on the current tokio runtime; cancelling
/// aborts the task.
pub fn from_future<T, Fut, F>(factory: F) -> impl Single<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T, FlowError>> + Send + 'static,
    F: Fn() -> Fut + Send + Sync,
{
    create(move |emitter: SingleEmitter<T>| {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            emitter.error(FlowError::Rejected(
                "future-backed single needs a tokio runtime".to_string(),
            ));
            return;
        };
        let future = factory();
        let task_emitter = emitter.clone();
        let task = runtime.spawn(async move {
            let result = future.await;
            task_emitter.settle(result);
        });
        let abort = task.abort_handle();
        emitter.on_cancel(move || abort.abort());
    })
}
