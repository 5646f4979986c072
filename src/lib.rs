//! Backpressured push signaling.
//!
//! Three protocol families share one set of rules: a subscriber is told it is
//! subscribed before anything else, it never sees a second terminal signal,
//! and it can always cancel.
//!
//! - [`streaming`]: `Publisher` / `Subscriber` / `Subscription` with
//!   demand-regulated delivery.
//! - [`single`]: exactly one value or one error.
//! - [`completable`]: completion or error, no value.
//!
//! ```no_run
//! use flowsig::streaming::{range, Publisher};
//! use flowsig::testing::TestSubscriber;
//!
//! let probe = TestSubscriber::new(3);
//! range(0, 10).subscribe(probe.clone());
//! assert_eq!(probe.items(), vec![0, 1, 2]);
//! ```

pub mod cancel;
pub mod completable;
pub mod config;
pub mod error;
pub mod logging;
mod outcome;
pub mod single;
pub mod streaming;
mod sync;
pub mod terminal;
pub mod testing;

pub use cancel::{CancelSlot, Cancellable, CancellationHandle};
pub use completable::{Completable, CompletableProcessor, CompletableSubscriber};
pub use config::FlowConfig;
pub use error::{ConfigError, FlowError, Result};
pub use single::{Single, SingleProcessor, SingleSubscriber};
pub use streaming::{Processor, Publisher, Subscriber, Subscription};
pub use terminal::{Terminal, TerminalState};
