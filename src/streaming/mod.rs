//! Demand-regulated streaming protocol.
//!
//! A [`Subscriber`] calls [`Publisher::subscribe`]; the publisher hands back a
//! [`Subscription`] through `on_subscribe`; the subscriber requests `n` items
//! at a time and the publisher never sends more than was requested.
//!
//! # Signal order
//!
//! ```text
//! on_subscribe  (on_next)*  (on_error | on_complete)?
//! ```
//!
//! - `on_subscribe` comes first and at most once per subscribe call.
//! - Nothing follows a terminal signal.
//! - Signals on one subscription never overlap, however many producer
//!   threads are involved.
//! - `request` and `cancel` may be called from inside any callback.
//!
//! # Delivery
//!
//! Every producer in this module funnels delivery through a single-owner
//! drain loop guarded by [`DrainGate`]. Threads that lose the race to enter
//! the drain only record their work and return, so no lock is held while a
//! subscriber runs and reentrant `request` calls never recurse.

pub mod channel;
pub mod demand;
pub mod drain;
pub mod emitter;
pub mod processor;
pub mod source;
pub mod stream;
pub mod subscription;

use crate::error::FlowError;
use std::sync::Arc;

/// Handle owned by one subscriber for one publisher relationship.
pub trait Subscription: Send + Sync {
    /// Add `n` to outstanding demand. `n <= 0` fails the subscription with
    /// [`FlowError::IllegalRequest`] instead of panicking here.
    fn request(&self, n: i64);

    /// Ask the publisher to stop. Idempotent and advisory: a signal already
    /// being delivered may still arrive.
    fn cancel(&self);
}

/// Receiver of streaming signals.
pub trait Subscriber<T>: Send + Sync {
    fn on_subscribe(&self, subscription: Arc<dyn Subscription>);

    fn on_next(&self, item: T);

    fn on_error(&self, error: FlowError);

    fn on_complete(&self);
}

/// Source of streaming signals. Every `subscribe` call starts an independent
/// relationship.
pub trait Publisher<T>: Send + Sync {
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>);
}

/// Both ends at once: consumes `T` from upstream, publishes `R` downstream.
pub trait Processor<T, R>: Subscriber<T> + Publisher<R> {}

impl<P, T, R> Processor<T, R> for P where P: Subscriber<T> + Publisher<R> + ?Sized {}

impl<T, P> Publisher<T> for Arc<P>
where
    P: Publisher<T> + ?Sized,
{
    fn subscribe(&self, subscriber: Arc<dyn Subscriber<T>>) {
        (**self).subscribe(subscriber)
    }
}

pub use channel::{Buffer, Offer, OverflowStrategy, DEFAULT_BUFFER_CAPACITY, DEFAULT_PREFETCH};
pub use demand::{Demand, UNBOUNDED};
pub use drain::DrainGate;
pub use emitter::{create, create_with, Emitter, EmitterPublisher};
pub use processor::{MapProcessor, PublishProcessor};
pub use source::{empty, failed, from_iter, generate, range, FnSource, IterSource, Source, SourcePublisher};
pub use stream::{from_stream, into_stream, PublisherStream, StreamPublisher};
pub use subscription::{reject, DeferredSubscription, EmptySubscription};
