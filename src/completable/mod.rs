//! Completion-only protocol: one `on_complete` or one `on_error`, no values.
//!
//! ```text
//! on_subscribe  (on_complete | on_error)?
//! ```

mod source;
mod subject;

use crate::cancel::Cancellable;
use crate::error::FlowError;
use std::sync::Arc;

pub trait CompletableSubscriber: Send + Sync {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>);

    fn on_complete(&self);

    fn on_error(&self, error: FlowError);
}

pub trait Completable: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>);
}

pub trait CompletableProcessor: CompletableSubscriber + Completable {}

impl<P> CompletableProcessor for P where P: CompletableSubscriber + Completable + ?Sized {}

impl<C> Completable for Arc<C>
where
    C: Completable + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>) {
        (**self).subscribe(subscriber)
    }
}

pub use source::{
    complete, create, failed, from_future, from_single, timeout, CompletableEmitter,
    CompletableTimeout, CreateCompletable, FromSingle,
};
pub use subject::CompletableSubject;
pub(crate) use source::relay_for;
