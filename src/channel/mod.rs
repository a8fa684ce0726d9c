//! Output channel: ordered delivery of turn events to the waiting client.

use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

use crate::error::{ErrorCategory, ThreadRunError};

/// Client-facing event, serialized as one JSON object per message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutputMessage {
    /// Passthrough of a provider event the classifier did not map.
    #[serde(rename = "event")]
    Event { event: String },
    #[serde(rename = "assistant_text")]
    AssistantText { content: String },
    #[serde(rename = "tool_progress", rename_all = "camelCase")]
    ToolProgress {
        call_id: String,
        tool_name: String,
        payload: serde_json::Value,
    },
    #[serde(rename = "error")]
    Error {
        message: String,
        category: ErrorCategory,
        retryable: bool,
    },
    #[serde(rename = "run-failed")]
    RunFailed { detail: serde_json::Value },
    #[serde(rename = "global-error")]
    GlobalError { detail: String },
    /// Normal completion marker.
    #[serde(rename = "finish", rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        run_id: Option<String>,
    },
}

impl OutputMessage {
    /// Whether this message ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Error { .. } | Self::RunFailed { .. } | Self::GlobalError { .. } | Self::Finish { .. }
        )
    }

    pub fn to_json_line(&self) -> String {
        // Every variant is a plain struct of strings and JSON values.
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"global-error","detail":"unserializable event: {e}"}}"#)
        })
    }
}

/// Terminal failure written by [`OutputChannel::fail`].
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalError {
    /// The remote run reported `thread.run.failed`.
    RunFailed(serde_json::Value),
    /// Transport or provider failure.
    Provider {
        message: String,
        category: ErrorCategory,
        retryable: bool,
    },
    /// The turn task itself crashed.
    Global(String),
}

impl From<&ThreadRunError> for TerminalError {
    fn from(err: &ThreadRunError) -> Self {
        Self::Provider {
            message: err.to_string(),
            category: err.category(),
            retryable: err.is_retryable(),
        }
    }
}

impl From<TerminalError> for OutputMessage {
    fn from(err: TerminalError) -> Self {
        match err {
            TerminalError::RunFailed(detail) => Self::RunFailed { detail },
            TerminalError::Provider {
                message,
                category,
                retryable,
            } => Self::Error {
                message,
                category,
                retryable,
            },
            TerminalError::Global(detail) => Self::GlobalError { detail },
        }
    }
}

/// What happened to an emitted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The channel was already closed; the message was discarded locally.
    Dropped,
    /// The receiving side is gone (client disconnected).
    Disconnected,
}

struct Inner {
    tx: Mutex<Option<mpsc::Sender<OutputMessage>>>,
    closed: AtomicBool,
}

/// Sending half. Cheap to clone; all clones share one closed state.
#[derive(Clone)]
pub struct OutputChannel {
    inner: Arc<Inner>,
}

/// Create a bounded channel. A full buffer applies backpressure to `emit`.
pub fn output_channel(capacity: usize) -> (OutputChannel, OutputReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let channel = OutputChannel {
        inner: Arc::new(Inner {
            tx: Mutex::new(Some(tx)),
            closed: AtomicBool::new(false),
        }),
    };
    (channel, OutputReceiver { rx })
}

impl OutputChannel {
    fn lock_tx(&self) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<OutputMessage>>> {
        self.inner
            .tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn sender(&self) -> Option<mpsc::Sender<OutputMessage>> {
        self.lock_tx().clone()
    }

    /// Mark closed and hand out the sender exactly once.
    ///
    /// Runs under the sender lock, the same lock every `emit` commits under,
    /// so nothing can be enqueued after the terminal marker.
    fn begin_terminal(&self) -> Option<mpsc::Sender<OutputMessage>> {
        let mut tx = self.lock_tx();
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return None;
        }
        tx.take()
    }

    async fn terminate(&self, marker: Option<OutputMessage>) -> bool {
        let Some(tx) = self.begin_terminal() else {
            return false;
        };
        if let Some(marker) = marker {
            if tx.send(marker).await.is_err() {
                tracing::debug!("receiver gone before terminal event");
            }
        }
        true
    }

    /// Append one message in FIFO order.
    ///
    /// Waits for buffer space first, then commits only if the channel is
    /// still open; a close that wins the race drops the message.
    pub async fn emit(&self, message: OutputMessage) -> Delivery {
        let Some(tx) = self.sender() else {
            tracing::warn!(?message, "emit after close dropped");
            return Delivery::Dropped;
        };
        let Ok(permit) = tx.reserve().await else {
            return Delivery::Disconnected;
        };
        let guard = self.lock_tx();
        if self.is_closed() {
            drop(guard);
            tracing::warn!(?message, "emit after close dropped");
            return Delivery::Dropped;
        }
        permit.send(message);
        drop(guard);
        Delivery::Delivered
    }

    /// Close with the default completion marker. Idempotent; returns whether
    /// this call performed the close.
    pub async fn close(&self) -> bool {
        self.complete(None, None).await
    }

    /// Close with a completion marker carrying the turn's identity.
    pub async fn complete(&self, thread_id: Option<String>, run_id: Option<String>) -> bool {
        self.terminate(Some(OutputMessage::Finish { thread_id, run_id }))
            .await
    }

    /// Emit a terminal error, then close. No completion marker follows.
    pub async fn fail(&self, error: TerminalError) -> bool {
        self.terminate(Some(error.into())).await
    }

    /// Close without any terminal event (cancellation).
    pub async fn abort(&self) -> bool {
        self.terminate(None).await
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Whether the client stopped listening.
    pub fn is_disconnected(&self) -> bool {
        self.sender().map_or(false, |tx| tx.is_closed())
    }
}

impl std::fmt::Debug for OutputChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputChannel")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Receiving half, consumed by the transport that serves the client.
#[derive(Debug)]
pub struct OutputReceiver {
    rx: mpsc::Receiver<OutputMessage>,
}

impl OutputReceiver {
    pub async fn recv(&mut self) -> Option<OutputMessage> {
        self.rx.recv().await
    }

    /// Drain every message until the channel closes.
    pub async fn collect_all(self) -> Vec<OutputMessage> {
        ReceiverStream::new(self.rx).collect().await
    }

    /// One JSON document per message, newline-terminated.
    pub fn into_ndjson(self) -> impl Stream<Item = String> + Send + 'static {
        ReceiverStream::new(self.rx).map(|message| {
            let mut line = message.to_json_line();
            line.push('\n');
            line
        })
    }
}

impl Stream for OutputReceiver {
    type Item = OutputMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn text(s: &str) -> OutputMessage {
        OutputMessage::AssistantText { content: s.into() }
    }

    #[tokio::test]
    async fn emits_in_fifo_order_then_finish() {
        let (channel, rx) = output_channel(8);
        for s in ["a", "b", "c"] {
            assert_eq!(channel.emit(text(s)).await, Delivery::Delivered);
        }
        assert!(channel.complete(Some("t1".into()), Some("run_1".into())).await);

        assert_eq!(
            rx.collect_all().await,
            vec![
                text("a"),
                text("b"),
                text("c"),
                OutputMessage::Finish {
                    thread_id: Some("t1".into()),
                    run_id: Some("run_1".into()),
                },
            ]
        );
    }

    #[tokio::test]
    async fn close_twice_emits_one_marker() {
        let (channel, rx) = output_channel(8);
        assert!(channel.close().await);
        assert!(!channel.close().await);
        assert!(!channel.fail(TerminalError::Global("late".into())).await);

        let messages = rx.collect_all().await;
        assert_eq!(messages, vec![OutputMessage::Finish { thread_id: None, run_id: None }]);
    }

    #[tokio::test]
    async fn emit_after_close_is_dropped_locally() {
        let (channel, rx) = output_channel(8);
        channel.close().await;
        assert_eq!(channel.emit(text("late")).await, Delivery::Dropped);
        assert_eq!(rx.collect_all().await.len(), 1);
    }

    #[tokio::test]
    async fn fail_emits_error_without_finish() {
        let (channel, rx) = output_channel(8);
        channel.emit(text("partial")).await;
        channel
            .fail(TerminalError::RunFailed(serde_json::json!({ "code": "rate_limit" })))
            .await;

        let messages = rx.collect_all().await;
        assert_eq!(
            messages,
            vec![
                text("partial"),
                OutputMessage::RunFailed { detail: serde_json::json!({ "code": "rate_limit" }) },
            ]
        );
    }

    #[tokio::test]
    async fn abort_closes_without_marker() {
        let (channel, rx) = output_channel(8);
        channel.emit(text("x")).await;
        channel.abort().await;
        assert_eq!(rx.collect_all().await, vec![text("x")]);
    }

    #[tokio::test]
    async fn dropped_receiver_reports_disconnect() {
        let (channel, rx) = output_channel(1);
        drop(rx);
        assert!(channel.is_disconnected());
        assert_eq!(channel.emit(text("x")).await, Delivery::Disconnected);
    }

    #[test]
    fn wire_shapes_match_client_contract() {
        let cases = vec![
            (
                OutputMessage::Event { event: "thread.run.completed".into() },
                serde_json::json!({ "type": "event", "event": "thread.run.completed" }),
            ),
            (text("Hi"), serde_json::json!({ "type": "assistant_text", "content": "Hi" })),
            (
                OutputMessage::RunFailed { detail: serde_json::json!({ "code": "x" }) },
                serde_json::json!({ "type": "run-failed", "detail": { "code": "x" } }),
            ),
            (
                OutputMessage::GlobalError { detail: "boom".into() },
                serde_json::json!({ "type": "global-error", "detail": "boom" }),
            ),
            (
                OutputMessage::Error {
                    message: "Timeout after 10ms".into(),
                    category: ErrorCategory::Timeout,
                    retryable: true,
                },
                serde_json::json!({
                    "type": "error",
                    "message": "Timeout after 10ms",
                    "category": "timeout",
                    "retryable": true,
                }),
            ),
            (
                OutputMessage::ToolProgress {
                    call_id: "c1".into(),
                    tool_name: "search".into(),
                    payload: serde_json::json!({ "step": 1 }),
                },
                serde_json::json!({
                    "type": "tool_progress",
                    "callId": "c1",
                    "toolName": "search",
                    "payload": { "step": 1 },
                }),
            ),
            (
                OutputMessage::Finish { thread_id: Some("t1".into()), run_id: None },
                serde_json::json!({ "type": "finish", "threadId": "t1" }),
            ),
        ];

        for (message, expected) in cases {
            assert_eq!(serde_json::to_value(&message).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn ndjson_lines_are_newline_terminated() {
        let (channel, rx) = output_channel(4);
        channel.emit(text("Hi")).await;
        channel.close().await;

        let lines: Vec<String> = rx.into_ndjson().collect().await;
        assert_eq!(
            lines,
            vec![
                "{\"type\":\"assistant_text\",\"content\":\"Hi\"}\n".to_string(),
                "{\"type\":\"finish\"}\n".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn emit_waiting_for_space_never_lands_after_finish() {
        let (channel, mut rx) = output_channel(1);
        channel.emit(text("fills the buffer")).await;

        let late = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.emit(text("late progress")).await })
        };
        tokio::task::yield_now().await;
        let closing = {
            let channel = channel.clone();
            tokio::spawn(async move { channel.close().await })
        };
        tokio::task::yield_now().await;

        let mut received = Vec::new();
        while let Some(message) = rx.recv().await {
            received.push(message);
        }
        assert!(closing.await.unwrap());
        let delivery = late.await.unwrap();

        assert_eq!(received.last(), Some(&OutputMessage::Finish { thread_id: None, run_id: None }));
        match delivery {
            Delivery::Dropped => assert_eq!(received.len(), 2),
            Delivery::Delivered => assert_eq!(received[1], text("late progress")),
            Delivery::Disconnected => panic!("receiver was still open"),
        }
    }
}
