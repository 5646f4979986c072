//! Single-result protocol: exactly one `on_success` or one `on_error`.
//!
//! ```text
//! on_subscribe  (on_success | on_error)?
//! ```
//!
//! There is no demand. The subscriber receives a [`Cancellable`] handle
//! instead; cancelling before the result is produced suppresses it, though a
//! result already being delivered may still land.

mod map;
mod source;
mod subject;
mod timeout;

use crate::cancel::Cancellable;
use crate::error::FlowError;
use std::sync::Arc;

pub trait SingleSubscriber<T>: Send + Sync {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>);

    fn on_success(&self, value: T);

    fn on_error(&self, error: FlowError);
}

pub trait Single<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<T>>);
}

/// Consumes one upstream result, produces its own.
pub trait SingleProcessor<T, R>: SingleSubscriber<T> + Single<R> {}

impl<P, T, R> SingleProcessor<T, R> for P where P: SingleSubscriber<T> + Single<R> + ?Sized {}

impl<T, S> Single<T> for Arc<S>
where
    S: Single<T> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<T>>) {
        (**self).subscribe(subscriber)
    }
}

pub use map::{map, try_map, MapSingle};
pub use source::{create, failed, from_future, just, CreateSingle, SingleEmitter};
pub use subject::SingleSubject;
pub use timeout::{timeout, Timeout};

pub(crate) use source::relay_for;
pub(crate) use timeout::{pass_through, Forward, MapFn};
