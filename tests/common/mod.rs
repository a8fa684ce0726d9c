//! Shared test helpers and a scripted assistant provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::{json, Value};

use threadrun::classify::RawEvent;
use threadrun::error::ThreadRunError;
use threadrun::provider::{AssistantProvider, MessageId, RawEventStream, RunSettings, ToolOutput};

/// A provider call, as recorded by [`ScriptedProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateThreadAndRun {
        user_message: String,
        settings: RunSettings,
    },
    AddMessage {
        thread_id: String,
        user_message: String,
    },
    CreateRun {
        thread_id: String,
    },
    SubmitToolOutputs {
        thread_id: String,
        run_id: String,
        outputs: Vec<ToolOutput>,
    },
}

/// What the next run-starting call returns.
pub enum Script {
    /// A stream that yields these events, then ends.
    Events(Vec<RawEvent>),
    /// Events followed by a transport error.
    EventsThenError(Vec<RawEvent>, ThreadRunError),
    /// Events, then the stream never yields again.
    EventsThenStall(Vec<RawEvent>),
    /// The call itself fails.
    Fail(ThreadRunError),
    /// The call panics.
    Panic(&'static str),
}

/// Provider that replays canned scripts in order and records every call.
#[derive(Default)]
pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(self, script: Script) -> Self {
        self.push(script);
        self
    }

    pub fn events(self, events: Vec<RawEvent>) -> Self {
        self.script(Script::Events(events))
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<Vec<ToolOutput>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SubmitToolOutputs { outputs, .. } => Some(outputs),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn next_stream(&self) -> Result<RawEventStream, ThreadRunError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ThreadRunError::InvalidState("no scripted run left".into()))?;
        Ok(match script {
            Script::Events(events) => stream::iter(events.into_iter().map(Ok)).boxed(),
            Script::EventsThenError(events, err) => stream::iter(events.into_iter().map(Ok))
                .chain(stream::once(async move { Err(err) }))
                .boxed(),
            Script::EventsThenStall(events) => stream::iter(events.into_iter().map(Ok))
                .chain(stream::pending())
                .boxed(),
            Script::Fail(err) => return Err(err),
            Script::Panic(message) => panic!("{message}"),
        })
    }
}

#[async_trait]
impl AssistantProvider for ScriptedProvider {
    fn provider_name(&self) -> &str {
        "scripted"
    }

    async fn create_thread_and_run(
        &self,
        user_message: &str,
        settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError> {
        self.record(Call::CreateThreadAndRun {
            user_message: user_message.to_string(),
            settings: settings.clone(),
        });
        self.next_stream()
    }

    async fn add_message(
        &self,
        thread_id: &str,
        user_message: &str,
    ) -> Result<MessageId, ThreadRunError> {
        self.record(Call::AddMessage {
            thread_id: thread_id.to_string(),
            user_message: user_message.to_string(),
        });
        Ok("msg_1".to_string())
    }

    async fn create_run(
        &self,
        thread_id: &str,
        _settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError> {
        self.record(Call::CreateRun {
            thread_id: thread_id.to_string(),
        });
        self.next_stream()
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RawEventStream, ThreadRunError> {
        self.record(Call::SubmitToolOutputs {
            thread_id: thread_id.to_string(),
            run_id: run_id.to_string(),
            outputs,
        });
        self.next_stream()
    }
}

// Raw event builders, shaped like the Assistants v2 stream.

pub fn thread_created(id: &str) -> RawEvent {
    RawEvent::new("thread.created", json!({ "id": id, "object": "thread" }))
}

pub fn run_created(id: &str) -> RawEvent {
    RawEvent::new(
        "thread.run.created",
        json!({ "id": id, "object": "thread.run", "status": "queued" }),
    )
}

pub fn text_delta(parts: &[&str]) -> RawEvent {
    let content: Vec<Value> = parts
        .iter()
        .enumerate()
        .map(|(index, text)| json!({ "index": index, "type": "text", "text": { "value": text } }))
        .collect();
    RawEvent::new(
        "thread.message.delta",
        json!({ "id": "msg_1", "delta": { "content": content } }),
    )
}

/// `requires_action` with `(call_id, tool_name, arguments)` triples.
pub fn requires_action(run_id: &str, calls: &[(&str, &str, &str)]) -> RawEvent {
    let tool_calls: Vec<Value> = calls
        .iter()
        .map(|(id, name, args)| {
            json!({ "id": id, "type": "function", "function": { "name": name, "arguments": args } })
        })
        .collect();
    RawEvent::new(
        "thread.run.requires_action",
        json!({
            "id": run_id,
            "status": "requires_action",
            "required_action": {
                "type": "submit_tool_outputs",
                "submit_tool_outputs": { "tool_calls": tool_calls },
            },
        }),
    )
}

pub fn run_failed(run_id: &str, last_error: Value) -> RawEvent {
    RawEvent::new(
        "thread.run.failed",
        json!({ "id": run_id, "status": "failed", "last_error": last_error }),
    )
}

pub fn run_completed(run_id: &str) -> RawEvent {
    RawEvent::new(
        "thread.run.completed",
        json!({ "id": run_id, "status": "completed" }),
    )
}
