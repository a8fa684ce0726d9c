//! Run orchestrator: drives one user turn against the remote assistant.
//!
//! A turn starts one run (creating the thread if needed), drains its event
//! stream through the classifier, answers tool calls, and queues each
//! continuation run until the queue is empty. The output channel is closed
//! exactly once, by [`RunOrchestrator::run_turn`], whatever the outcome.

pub mod dispatch;
pub mod handle;
pub mod queue;
pub mod types;

pub use dispatch::{dispatch_batch, encode_output, DispatchedCall};
pub use handle::TurnHandle;
pub use queue::{RunOrigin, RunQueue, RunQueueEntry};
pub use types::{TurnOutcome, TurnPhase, TurnRequest, TurnStatus};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::channel::{output_channel, Delivery, OutputChannel, OutputMessage, TerminalError};
use crate::classify::{classify, RunIdentity, ToolCallRequest, TypedEvent};
use crate::config::{ThreadRunConfig, DEFAULT_CHANNEL_CAPACITY, DEFAULT_IDLE_TIMEOUT_MS};
use crate::error::ThreadRunError;
use crate::provider::{AssistantProvider, ToolOutput};
use crate::tools::ToolRegistry;
use crate::transcript::Transcript;
use crate::util::{next_within, panic_message};

/// Drives turns for any number of independent conversations.
///
/// Holds no per-conversation state; every turn gets its own identity, queue
/// and transcript.
#[derive(Clone)]
pub struct RunOrchestrator {
    provider: Arc<dyn AssistantProvider>,
    tools: Arc<ToolRegistry>,
    idle_timeout: Option<Duration>,
    channel_capacity: usize,
}

impl std::fmt::Debug for RunOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunOrchestrator")
            .field("provider", &self.provider.provider_name())
            .field("tools", &self.tools)
            .field("idle_timeout", &self.idle_timeout)
            .field("channel_capacity", &self.channel_capacity)
            .finish()
    }
}

impl RunOrchestrator {
    pub fn new(provider: Arc<dyn AssistantProvider>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            tools,
            idle_timeout: Some(Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS)),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Apply idle timeout and channel capacity from config.
    pub fn with_config(mut self, config: &ThreadRunConfig) -> Self {
        self.idle_timeout = config.idle_timeout();
        self.channel_capacity = config.channel_capacity;
        self
    }

    /// Max wait for each raw event. `None` waits forever.
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.idle_timeout = timeout;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn on the current task, writing events to `channel`.
    ///
    /// Never returns an error: failures are reported on the channel and in the
    /// outcome's status.
    pub async fn run_turn(
        &self,
        request: TurnRequest,
        channel: &OutputChannel,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut turn = Turn {
            orchestrator: self,
            channel,
            cancel,
            identity: RunIdentity::for_thread(request.thread_id.clone()),
            queue: RunQueue::new(),
            transcript: Transcript::new(),
            phase: TurnPhase::Idle,
        };
        let end = turn.drive(request).await;
        turn.finish(end).await
    }

    /// Spawn a turn on the runtime and return a handle to its events.
    ///
    /// A supervisor task reports a crash of the turn task as `global-error`.
    pub fn spawn_turn(&self, request: TurnRequest) -> TurnHandle {
        let (channel, events) = output_channel(self.channel_capacity);
        let cancel = CancellationToken::new();

        let orchestrator = self.clone();
        let turn_channel = channel.clone();
        let turn_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            orchestrator
                .run_turn(request, &turn_channel, &turn_cancel)
                .await
        });

        let supervisor = tokio::spawn(async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(err) => {
                    let detail = if err.is_panic() {
                        format!("turn task panicked: {}", panic_message(err.into_panic().as_ref()))
                    } else {
                        "turn task was aborted".to_string()
                    };
                    tracing::error!(error = %detail, "turn task crashed");
                    channel.fail(TerminalError::Global(detail.clone())).await;
                    TurnOutcome::failed(detail)
                }
            }
        });

        TurnHandle::new(events, cancel, supervisor)
    }
}

/// How the run queue stopped.
enum TurnEnd {
    Completed,
    RunFailed(serde_json::Value),
}

/// How one run's stream stopped.
enum DrainEnd {
    Exhausted,
    RunFailed(serde_json::Value),
}

/// Per-turn state, owned by one `run_turn` call.
struct Turn<'a> {
    orchestrator: &'a RunOrchestrator,
    channel: &'a OutputChannel,
    cancel: &'a CancellationToken,
    identity: RunIdentity,
    queue: RunQueue,
    transcript: Transcript,
    phase: TurnPhase,
}

/// Await a provider call unless the turn is canceled first.
async fn until_canceled<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ThreadRunError>>,
) -> Result<T, ThreadRunError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ThreadRunError::Canceled),
        result = fut => result,
    }
}

/// Emit, treating a vanished receiver as cancellation.
async fn forward(channel: &OutputChannel, message: OutputMessage) -> Result<(), ThreadRunError> {
    match channel.emit(message).await {
        Delivery::Disconnected => {
            debug!("client disconnected");
            Err(ThreadRunError::Canceled)
        }
        Delivery::Delivered | Delivery::Dropped => Ok(()),
    }
}

impl<'a> Turn<'a> {
    fn enter(&mut self, phase: TurnPhase) {
        if self.phase != phase {
            debug!(
                from = %self.phase,
                to = %phase,
                thread_id = ?self.identity.thread_id(),
                run_id = ?self.identity.run_id(),
                "turn phase"
            );
            self.phase = phase;
        }
    }

    async fn drive(&mut self, request: TurnRequest) -> Result<TurnEnd, ThreadRunError> {
        self.enter(TurnPhase::Starting);
        let TurnRequest {
            user_message,
            thread_id,
            mut settings,
        } = request;
        if settings.tools.is_empty() {
            settings.tools = self.orchestrator.tools.definitions();
        }
        self.transcript.push_user(user_message.as_str());

        let provider = Arc::clone(&self.orchestrator.provider);
        let events = match thread_id.as_deref() {
            Some(thread_id) => {
                let message_id =
                    until_canceled(self.cancel, provider.add_message(thread_id, &user_message))
                        .await?;
                debug!(thread_id, message_id = %message_id, "user message appended");
                until_canceled(self.cancel, provider.create_run(thread_id, &settings)).await?
            }
            None => {
                until_canceled(
                    self.cancel,
                    provider.create_thread_and_run(&user_message, &settings),
                )
                .await?
            }
        };
        self.queue.push(RunOrigin::Initial, events);

        while let Some(entry) = self.queue.pop() {
            self.enter(TurnPhase::Draining);
            if let DrainEnd::RunFailed(detail) = self.drain(entry).await? {
                return Ok(TurnEnd::RunFailed(detail));
            }
        }
        debug!(
            runs = self.queue.total_enqueued(),
            thread_id = ?self.identity.thread_id(),
            "run queue empty"
        );
        Ok(TurnEnd::Completed)
    }

    async fn drain(&mut self, entry: RunQueueEntry) -> Result<DrainEnd, ThreadRunError> {
        let RunQueueEntry {
            correlation_id,
            origin,
            mut events,
        } = entry;
        debug!(%correlation_id, ?origin, "draining run");

        let idle_timeout = self.orchestrator.idle_timeout;
        let mut raw_events = 0usize;
        loop {
            if self.channel.is_disconnected() {
                debug!(%correlation_id, "client disconnected");
                return Err(ThreadRunError::Canceled);
            }
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ThreadRunError::Canceled),
                next = next_within(&mut events, idle_timeout) => next?,
            };
            let Some(raw) = next else {
                break;
            };
            let raw = raw?;
            raw_events += 1;

            let mut pending: Vec<ToolCallRequest> = Vec::new();
            for event in classify(&raw, &mut self.identity) {
                match event {
                    TypedEvent::ThreadCreated { thread_id } => {
                        debug!(%correlation_id, thread_id = %thread_id, "thread created");
                    }
                    TypedEvent::RunCreated { run_id } => {
                        debug!(%correlation_id, run_id = %run_id, "run created");
                    }
                    TypedEvent::TextDelta { text } => {
                        self.transcript
                            .push_assistant_text(self.identity.run_id(), &text);
                        forward(self.channel, OutputMessage::AssistantText { content: text })
                            .await?;
                    }
                    TypedEvent::ToolCallRequest(call) => pending.push(call),
                    TypedEvent::RunFailed { detail } => {
                        warn!(
                            %correlation_id,
                            run_id = ?self.identity.run_id(),
                            detail = %detail,
                            "run failed"
                        );
                        return Ok(DrainEnd::RunFailed(detail));
                    }
                    TypedEvent::Info { event } => {
                        forward(self.channel, OutputMessage::Event { event }).await?;
                    }
                    TypedEvent::Malformed { event, reason } => {
                        return Err(ThreadRunError::Stream(format!(
                            "cannot act on {event}: {reason}"
                        )));
                    }
                }
            }

            if !pending.is_empty() {
                self.dispatch_and_resume(pending).await?;
            }
        }

        debug!(%correlation_id, raw_events, "run drained");
        Ok(DrainEnd::Exhausted)
    }

    /// Answer a tool batch and queue the continuation run.
    async fn dispatch_and_resume(
        &mut self,
        calls: Vec<ToolCallRequest>,
    ) -> Result<(), ThreadRunError> {
        self.enter(TurnPhase::ToolDispatch);
        let (Some(thread_id), Some(run_id)) = (
            self.identity.thread_id().map(str::to_string),
            self.identity.run_id().map(str::to_string),
        ) else {
            return Err(ThreadRunError::Stream(
                "tool calls requested before the run was identified".to_string(),
            ));
        };

        self.transcript.push_tool_calls(Some(&run_id), &calls);
        debug!(thread_id = %thread_id, run_id = %run_id, count = calls.len(), "dispatching tool batch");

        // Not cancellable: tools with side effects always run to completion.
        let results = dispatch_batch(&self.orchestrator.tools, &calls, self.channel).await;
        for result in &results {
            self.transcript.push_tool_result(
                Some(&run_id),
                result.call_id.as_str(),
                result.output.as_str(),
                result.is_error,
            );
        }

        if self.cancel.is_cancelled() || self.channel.is_disconnected() {
            debug!(run_id = %run_id, "turn canceled during tool batch; skipping submission");
            return Err(ThreadRunError::Canceled);
        }

        self.enter(TurnPhase::Resuming);
        let outputs: Vec<ToolOutput> = results.into_iter().map(ToolOutput::from).collect();
        let provider = Arc::clone(&self.orchestrator.provider);
        let events = until_canceled(
            self.cancel,
            provider.submit_tool_outputs(&thread_id, &run_id, outputs),
        )
        .await?;
        let correlation_id = self.queue.push(
            RunOrigin::Continuation {
                previous_run_id: run_id.clone(),
            },
            events,
        );
        debug!(%correlation_id, previous_run_id = %run_id, queued = self.queue.len(), "continuation queued");
        Ok(())
    }

    /// Close the channel exactly once and build the outcome.
    async fn finish(mut self, end: Result<TurnEnd, ThreadRunError>) -> TurnOutcome {
        let thread_id = self.identity.thread_id().map(str::to_string);
        let run_id = self.identity.run_id().map(str::to_string);

        let status = match end {
            Ok(TurnEnd::Completed) => {
                self.enter(TurnPhase::Done);
                self.channel.complete(thread_id.clone(), run_id.clone()).await;
                TurnStatus::Completed
            }
            Ok(TurnEnd::RunFailed(detail)) => {
                self.enter(TurnPhase::Errored);
                let error = format!("run failed: {detail}");
                self.channel.fail(TerminalError::RunFailed(detail)).await;
                TurnStatus::Failed { error }
            }
            Err(ThreadRunError::Canceled) => {
                self.enter(TurnPhase::Canceled);
                self.channel.abort().await;
                TurnStatus::Canceled
            }
            Err(err) => {
                self.enter(TurnPhase::Errored);
                warn!(
                    thread_id = ?thread_id,
                    run_id = ?run_id,
                    error = %err,
                    category = %err.category(),
                    "turn failed"
                );
                self.channel.fail(TerminalError::from(&err)).await;
                TurnStatus::Failed {
                    error: err.to_string(),
                }
            }
        };

        TurnOutcome {
            status,
            thread_id,
            run_id,
            runs_drained: self.queue.total_dequeued(),
            transcript: self.transcript,
            finished_at: Utc::now(),
        }
    }
}
