use crate::cancel::{CancelSlot, Cancellable};
use crate::completable::{relay_for, Completable, CompletableSubscriber};
use crate::error::FlowError;
use crate::outcome::OutcomeRelay;
use crate::sync::lock;
use crate::terminal::TerminalState;
use std::sync::{Arc, Mutex};

/// Multicast completable processor; remembers the terminal signal and replays
/// it to subscribers that arrive afterwards.
#[derive(Default)]
pub struct CompletableSubject {
    upstream: Arc<CancelSlot>,
    terminal: TerminalState,
    state: Mutex<SubjectState>,
}

#[derive(Default)]
struct SubjectState {
    outcome: Option<Result<(), FlowError>>,
    waiting: Vec<Arc<OutcomeRelay<()>>>,
}

impl CompletableSubject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_terminated(&self) -> bool {
        self.terminal.is_terminated()
    }

    pub fn cancel_upstream(&self) {
        self.upstream.cancel();
    }

    fn settle(&self, outcome: Result<(), FlowError>) {
        let won = match &outcome {
            Ok(()) => self.terminal.try_complete(),
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
        tracing::debug!(subscribers = waiting.len(), "Completable subject terminated");
        for relay in waiting {
            relay.settle(outcome.clone());
        }
    }
}

impl CompletableSubscriber for CompletableSubject {
    fn on_subscribe(&self, handle: Arc<dyn Cancellable>) {
        if !self.upstream.set(handle) && !self.upstream.is_cancelled() {
            tracing::warn!("Rule violation: completable processor subscribed twice, cancelling");
        }
    }

    fn on_complete(&self) {
        self.settle(Ok(()));
    }

    fn on_error(&self, error: FlowError) {
        self.settle(Err(error));
    }
}

impl Completable for CompletableSubject {
    fn subscribe(&self, subscriber: Arc<dyn CompletableSubscriber>) {
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
