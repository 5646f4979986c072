//! Locking helper shared by every protocol family.

use std::sync::{Mutex, MutexGuard};

/// Lock that never stays poisoned. Callbacks and hooks run outside every
/// lock, so no invariant spans a panic while one is held.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
