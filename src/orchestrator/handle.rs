//! Handle for a spawned turn.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::types::{TurnOutcome, TurnStatus};
use crate::channel::OutputReceiver;

/// Handle for an in-flight turn started with `spawn_turn`.
#[derive(Debug)]
pub struct TurnHandle {
    events: Option<OutputReceiver>,
    cancel: CancellationToken,
    result: JoinHandle<TurnOutcome>,
}

impl TurnHandle {
    pub(crate) fn new(
        events: OutputReceiver,
        cancel: CancellationToken,
        result: JoinHandle<TurnOutcome>,
    ) -> Self {
        Self {
            events: Some(events),
            cancel,
            result,
        }
    }

    /// Take the client-facing event stream. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<OutputReceiver> {
        self.events.take()
    }

    /// Stop consuming provider events. An in-flight tool batch still finishes.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.result.is_finished()
    }

    pub async fn wait(self) -> TurnOutcome {
        match self.result.await {
            Ok(outcome) => outcome,
            Err(err) if err.is_cancelled() => TurnOutcome::new(TurnStatus::Canceled),
            Err(err) => TurnOutcome::failed(format!("turn supervisor failed: {err}")),
        }
    }
}
