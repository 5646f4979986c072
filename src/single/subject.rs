use crate::cancel::{CancelSlot, Cancellable};
use crate::error::FlowError;
use crate::outcome::OutcomeRelay;
use crate::single::{relay_for, Single, SingleSubscriber};
use crate::sync::lock;
use crate::terminal::TerminalState;
use std::sync::{Arc, Mutex};

type Mapper<T, R> = Box<dyn Fn(T) -> Result<R, FlowError> + Send + Sync>;

/// Multicast single processor.
///
/// Subscribes to one upstream `Single`, optionally transforms its value, and
/// replays the outcome to every subscriber, including ones that arrive after
/// it was produced. Downstream cancellation never cancels the upstream; use
/// [`SingleSubject::cancel_upstream`] for that.
pub struct SingleSubject<T, R = T> {
    mapper: Mapper<T, R>,
    upstream: Arc<CancelSlot>,
    terminal: TerminalState,
    state: Mutex<SubjectState<R>>,
}

struct SubjectState<R> {
    outcome: Option<Result<R, FlowError>>,
    waiting: Vec<Arc<OutcomeRelay<R>>>,
}

impl<T> SingleSubject<T, T>
where
    T: Clone + Send + 'static,
{
    pub fn new() -> Self {
        Self::try_map(Ok)
    }
}

impl<T> Default for SingleSubject<T, T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, R> SingleSubject<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    pub fn map<F>(f: F) -> Self
    where
        F: Fn(T) -> R + Send + Sync + 'static,
    {
        Self::try_map(move |value| Ok(f(value)))
    }

    pub fn try_map<F>(f: F) -> Self
    where
        F: Fn(T) -> Result<R, FlowError> + Send + Sync + 'static,
    {
        Self {
            mapper: Box::new(f),
            upstream: CancelSlot::new(),
            terminal: TerminalState::new(),
            state: Mutex::new(SubjectState {
                outcome: None,
                waiting: Vec::new(),
            }),
        }
    }

    pub fn has_outcome(&self) -> bool {
        lock(&self.state).outcome.is_some()
    }

    pub fn cancel_upstream(&self) {
        self.upstream.cancel();
    }

    fn settle(&self, outcome: Result<R, FlowError>) {
        let won = match &outcome {
            Ok(_) => self.terminal.try_complete(),
            Err(_) => self.terminal.try_error(),
        };
        if !won {
            return;
        }
        let waiting = {
            let mut state = lock(&self.state);
            state.outcome = Some(outcome.clone());
            std::mem::take(&mut state.waiting)
        };
        for relay in waiting {
            relay.settle(outcome.clone());
        }
    }
}

impl<T, R> SingleSubscriber<T> for SingleSubject<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        if !self.upstream.set(handle) {
            tracing::warn!("Rule violation: single processor subscribed twice, cancelling");
        }
    }

    fn on_success(&self, value: T) {
        if self.terminal.is_terminated() {
            return;
        }
        self.settle((self.mapper)(value));
    }

    fn on_error(&self, error: FlowError) {
        self.settle(Err(error));
    }
}

impl<T, R> Single<R> for SingleSubject<T, R>
where
    T: Send + 'static,
    R: Clone + Send + 'static,
{
    fn subscribe(&self, subscriber: Arc<dyn SingleSubscriber<R>>) {
        let relay = relay_for(subscriber.clone());
        subscriber.on_subscribe(relay.handle());
        if relay.is_cancelled() {
            return;
        }

        let outcome = {
            let mut state = lock(&self.state);
            match &state.outcome {
                Some(outcome) => Some(outcome.clone()),
                None => {
                    state.waiting.retain(|r| !r.is_done());
                    state.waiting.push(relay.clone());
                    None
                }
            }
        };
        if let Some(outcome) = outcome {
            relay.settle(outcome);
        }
    }
}
