//! Tool batch execution for a `requires_action` run.

use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde_json::Value;

use crate::channel::{OutputChannel, OutputMessage};
use crate::classify::ToolCallRequest;
use crate::provider::ToolOutput;
use crate::tools::{ProgressSink, ToolExecutionContext, ToolRegistry};

/// Result of one tool call, already encoded for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedCall {
    pub call_id: String,
    pub tool_name: String,
    pub output: String,
    pub is_error: bool,
}

impl From<DispatchedCall> for ToolOutput {
    fn from(call: DispatchedCall) -> Self {
        ToolOutput {
            call_id: call.call_id,
            output: call.output,
        }
    }
}

/// Tool output wire encoding: strings verbatim, anything else as JSON.
pub fn encode_output(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn progress_sink(channel: &OutputChannel, call: &ToolCallRequest) -> ProgressSink {
    let channel = channel.clone();
    let call_id = call.call_id.clone();
    let tool_name = call.tool_name.clone();
    Arc::new(move |payload| {
        let channel = channel.clone();
        let message = OutputMessage::ToolProgress {
            call_id: call_id.clone(),
            tool_name: tool_name.clone(),
            payload,
        };
        async move {
            channel.emit(message).await;
        }
        .boxed()
    })
}

/// Run every call of the batch concurrently and answer each one.
///
/// Failures are isolated: a failing or panicking tool yields an error payload
/// for its own call and the rest of the batch still runs. Results come back
/// in request order.
pub async fn dispatch_batch(
    registry: &ToolRegistry,
    calls: &[ToolCallRequest],
    channel: &OutputChannel,
) -> Vec<DispatchedCall> {
    let futures = calls.iter().map(|call| async move {
        let ctx = ToolExecutionContext::new(&call.call_id, &call.tool_name)
            .with_progress(progress_sink(channel, call));
        let result = registry
            .invoke(&call.tool_name, &call.arguments, &ctx)
            .await;
        match result {
            Ok(value) => DispatchedCall {
                call_id: call.call_id.clone(),
                tool_name: call.tool_name.clone(),
                output: encode_output(&value),
                is_error: false,
            },
            Err(err) => {
                tracing::warn!(
                    call_id = %call.call_id,
                    tool_name = %call.tool_name,
                    error = %err,
                    "tool call failed; submitting error output"
                );
                DispatchedCall {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    output: encode_output(&err.to_output_payload()),
                    is_error: true,
                }
            }
        }
    });
    join_all(futures).await
}
