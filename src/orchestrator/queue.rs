//! FIFO of runs awaiting drainage within one turn.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::provider::RawEventStream;

/// Why a run was queued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOrigin {
    /// The run started by the user's message.
    Initial,
    /// The run returned after submitting tool outputs for `previous_run_id`.
    Continuation { previous_run_id: String },
}

/// A run's event stream tagged with a local correlation id.
pub struct RunQueueEntry {
    pub correlation_id: Uuid,
    pub origin: RunOrigin,
    pub events: RawEventStream,
}

impl std::fmt::Debug for RunQueueEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunQueueEntry")
            .field("correlation_id", &self.correlation_id)
            .field("origin", &self.origin)
            .finish()
    }
}

/// Pending runs, drained strictly in insertion order.
///
/// Continuations are appended here instead of being drained inline, so a
/// long chain of tool rounds grows the queue rather than the call stack.
#[derive(Debug, Default)]
pub struct RunQueue {
    entries: VecDeque<RunQueueEntry>,
    enqueued: usize,
    dequeued: usize,
}

impl RunQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a run and return its correlation id.
    pub fn push(&mut self, origin: RunOrigin, events: RawEventStream) -> Uuid {
        let correlation_id = Uuid::new_v4();
        self.entries.push_back(RunQueueEntry {
            correlation_id,
            origin,
            events,
        });
        self.enqueued += 1;
        correlation_id
    }

    pub fn pop(&mut self) -> Option<RunQueueEntry> {
        let entry = self.entries.pop_front()?;
        self.dequeued += 1;
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total_enqueued(&self) -> usize {
        self.enqueued
    }

    pub fn total_dequeued(&self) -> usize {
        self.dequeued
    }
}
