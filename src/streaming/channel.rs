//! Buffers between producer threads and the drain loop.
//!
//! Producers push into a [`Buffer`]; the drain owner pops as demand allows.
//! Bounded buffers apply an [`OverflowStrategy`] when full.

use crossbeam_channel::{Receiver, Sender, TryRecvError, TrySendError};
use serde::Deserialize;

/// Default items requested upstream per batch
pub const DEFAULT_PREFETCH: usize = 128;

/// Default per-subscriber buffer capacity
pub const DEFAULT_BUFFER_CAPACITY: usize = 256;

/// What a full bounded buffer does with a new item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowStrategy {
    /// Fail the subscription with `FlowError::Overflow`
    #[default]
    Error,
    /// Discard the incoming item
    DropLatest,
    /// Discard the oldest buffered item to make room
    DropOldest,
    /// Never full; capacity is ignored
    Unbounded,
}

impl OverflowStrategy {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "error" => Some(Self::Error),
            "drop_latest" => Some(Self::DropLatest),
            "drop_oldest" => Some(Self::DropOldest),
            "unbounded" => Some(Self::Unbounded),
            _ => None,
        }
    }
}

/// Result of [`Buffer::offer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Accepted, but an older or the new item was discarded
    Dropped,
    /// Rejected under `OverflowStrategy::Error`
    Overflow,
}

/// Multi-producer buffer drained by one consumer at a time.
#[derive(Debug)]
pub struct Buffer<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
    capacity: usize,
    strategy: OverflowStrategy,
}

impl<T> Buffer<T> {
    pub fn new(capacity: usize, strategy: OverflowStrategy) -> Self {
        let (tx, rx) = match strategy {
            OverflowStrategy::Unbounded => crossbeam_channel::unbounded(),
            _ => crossbeam_channel::bounded(capacity.max(1)),
        };
        Self {
            tx,
            rx,
            capacity: capacity.max(1),
            strategy,
        }
    }

    pub fn offer(&self, item: T) -> Offer {
        let mut item = match self.tx.try_send(item) {
            Ok(()) => return Offer::Accepted,
            Err(TrySendError::Full(item)) => item,
            // Both ends live in `self`.
            Err(TrySendError::Disconnected(_)) => return Offer::Overflow,
        };

        match self.strategy {
            OverflowStrategy::Error => Offer::Overflow,
            OverflowStrategy::DropLatest => Offer::Dropped,
            OverflowStrategy::DropOldest | OverflowStrategy::Unbounded => loop {
                let _ = self.rx.try_recv();
                match self.tx.try_send(item) {
                    Ok(()) => return Offer::Dropped,
                    Err(TrySendError::Full(back)) => item = back,
                    Err(TrySendError::Disconnected(_)) => return Offer::Overflow,
                }
            },
        }
    }

    pub fn poll(&self) -> Option<T> {
        match self.rx.try_recv() {
            Ok(item) => Some(item),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    pub fn clear(&self) {
        while self.rx.try_recv().is_ok() {}
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn strategy(&self) -> OverflowStrategy {
        self.strategy
    }
}
