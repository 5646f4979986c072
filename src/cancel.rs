//! Cancellation handles for the single-result and completable protocols.

use crate::sync::lock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Handle passed to `on_subscribe` by `Single` and `Completable` producers.
pub trait Cancellable: Send + Sync {
    /// Ask the producer to stop. Idempotent and advisory: a result already in
    /// flight may still be delivered.
    fn cancel(&self);

    fn is_cancelled(&self) -> bool;
}

type Hook = Box<dyn FnOnce() + Send>;

/// One-way "not cancelled" -> "cancelled" flag with release hooks.
#[derive(Default)]
pub struct CancellationHandle {
    cancelled: AtomicBool,
    hooks: Mutex<Vec<Hook>>,
}

impl CancellationHandle {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Run `hook` once on the first cancel, or right away if already cancelled.
    pub fn on_cancel<F>(&self, hook: F)
    where
        F: FnOnce() + Send + 'static,
    {
        {
            let mut hooks = lock(&self.hooks);
            if !self.cancelled.load(Ordering::Acquire) {
                hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Returns true for the call that performed the transition.
    pub fn cancel_first(&self) -> bool {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return false;
        }
        let hooks = std::mem::take(&mut *lock(&self.hooks));
        for hook in hooks {
            hook();
        }
        true
    }
}

impl Cancellable for CancellationHandle {
    fn cancel(&self) {
        if self.cancel_first() {
            tracing::debug!("Cancellation handle disposed");
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// Forwards cancellation to whichever upstream handle is installed later.
///
/// Processors hand this to their downstream before the upstream handle exists;
/// a cancel that arrives first is replayed onto the upstream handle when set.
#[derive(Default)]
pub struct CancelSlot {
    handle: CancellationHandle,
    upstream: Mutex<Option<Arc<dyn Cancellable>>>,
}

impl CancelSlot {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Install the upstream handle. Returns false if one was already set, in
    /// which case `upstream` is cancelled.
    pub fn set(&self, upstream: Arc<dyn Cancellable>) -> bool {
        {
            let mut slot = lock(&self.upstream);
            if slot.is_none() && !self.handle.is_cancelled() {
                *slot = Some(upstream);
                return true;
            }
        }
        upstream.cancel();
        false
    }
}

impl Cancellable for CancelSlot {
    fn cancel(&self) {
        if !self.handle.cancel_first() {
            return;
        }
        let upstream = lock(&self.upstream).take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
    }

    fn is_cancelled(&self) -> bool {
        self.handle.is_cancelled()
    }
}
