//! Delta classifier: raw provider stream events to typed events.
//!
//! Every provider event name is interpreted here and nowhere else, so protocol
//! drift stays contained in this module.

use serde::{Deserialize, Serialize};
use strum::EnumString;

/// One unprocessed `{event, data}` pair from the provider's stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawEvent {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl RawEvent {
    pub fn new(event: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn kind(&self) -> RawEventKind {
        self.event
            .parse()
            .unwrap_or_else(|_| RawEventKind::Other(self.event.clone()))
    }
}

/// Provider event names the classifier understands.
#[derive(Debug, Clone, PartialEq, Eq, EnumString)]
pub enum RawEventKind {
    #[strum(serialize = "thread.created")]
    ThreadCreated,
    #[strum(serialize = "thread.run.created")]
    RunCreated,
    #[strum(serialize = "thread.message.delta")]
    MessageDelta,
    #[strum(serialize = "thread.run.requires_action")]
    RunRequiresAction,
    #[strum(serialize = "thread.run.failed")]
    RunFailed,
    #[strum(default)]
    Other(String),
}

/// A tool invocation the remote run is blocked on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub call_id: String,
    pub tool_name: String,
    /// Opaque JSON argument string, exactly as the provider sent it.
    pub arguments: String,
}

/// Normalized event produced from a single raw event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum TypedEvent {
    ThreadCreated { thread_id: String },
    RunCreated { run_id: String },
    TextDelta { text: String },
    ToolCallRequest(ToolCallRequest),
    RunFailed { detail: serde_json::Value },
    Info { event: String },
    /// A recognized event whose payload cannot be acted on. The run cannot
    /// make progress, so the turn must fail.
    Malformed { event: String, reason: String },
}

/// Conversation and run identity observed while classifying a turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunIdentity {
    thread_id: Option<String>,
    run_id: Option<String>,
}

impl RunIdentity {
    /// Identity for a turn continuing an existing conversation.
    pub fn for_thread(thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            ..Self::default()
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }

    pub fn run_id(&self) -> Option<&str> {
        self.run_id.as_deref()
    }

    /// Assign the thread id. Once set it never changes; returns `false` when
    /// a different id was ignored.
    fn assign_thread(&mut self, id: &str) -> bool {
        match &self.thread_id {
            None => {
                self.thread_id = Some(id.to_string());
                true
            }
            Some(existing) => existing == id,
        }
    }

    fn assign_run(&mut self, id: &str) {
        self.run_id = Some(id.to_string());
    }
}

/// Classify one raw event, updating `identity` as a side effect.
///
/// Returned events preserve the provider's order: text parts in array order,
/// tool calls in the order they were listed. Events that cannot be mapped
/// degrade to [`TypedEvent::Info`], except a `requires_action` that cannot be
/// answered in full, which is [`TypedEvent::Malformed`].
pub fn classify(raw: &RawEvent, identity: &mut RunIdentity) -> Vec<TypedEvent> {
    let info = || {
        vec![TypedEvent::Info {
            event: raw.event.clone(),
        }]
    };

    match raw.kind() {
        RawEventKind::ThreadCreated => match object_id(&raw.data) {
            Some(id) => {
                if !identity.assign_thread(id) {
                    tracing::warn!(
                        thread_id = identity.thread_id().unwrap_or_default(),
                        ignored = id,
                        "ignoring thread reassignment"
                    );
                }
                // Report the id the turn is bound to, never the ignored one.
                let thread_id = identity.thread_id().unwrap_or(id).to_string();
                vec![TypedEvent::ThreadCreated { thread_id }]
            }
            None => info(),
        },
        RawEventKind::RunCreated => match object_id(&raw.data) {
            Some(id) => {
                identity.assign_run(id);
                vec![TypedEvent::RunCreated {
                    run_id: id.to_string(),
                }]
            }
            None => info(),
        },
        RawEventKind::MessageDelta => {
            let deltas: Vec<TypedEvent> = text_parts(&raw.data)
                .into_iter()
                .map(|text| TypedEvent::TextDelta { text })
                .collect();
            if deltas.is_empty() {
                info()
            } else {
                deltas
            }
        }
        RawEventKind::RunRequiresAction => match tool_call_requests(&raw.data) {
            Ok(requests) => requests
                .into_iter()
                .map(TypedEvent::ToolCallRequest)
                .collect(),
            Err(reason) => {
                tracing::warn!(event = %raw.event, %reason, "unanswerable requires_action");
                vec![TypedEvent::Malformed {
                    event: raw.event.clone(),
                    reason,
                }]
            }
        },
        RawEventKind::RunFailed => {
            vec![TypedEvent::RunFailed {
                detail: raw.data.clone(),
            }]
        }
        RawEventKind::Other(_) => info(),
    }
}

fn object_id(data: &serde_json::Value) -> Option<&str> {
    data.get("id").and_then(|v| v.as_str())
}

/// Text fragments of a `thread.message.delta`, in content order.
///
/// Accepts both `{"type":"text","text":{"value":".."}}` and the bare
/// `{"text":".."}` shape.
fn text_parts(data: &serde_json::Value) -> Vec<String> {
    let Some(parts) = data
        .pointer("/delta/content")
        .and_then(|c| c.as_array())
    else {
        return Vec::new();
    };

    parts
        .iter()
        .filter(|part| {
            part.get("type")
                .and_then(|t| t.as_str())
                .map_or(true, |t| t == "text")
        })
        .filter_map(|part| {
            let text = part.get("text")?;
            text.as_str()
                .or_else(|| text.get("value").and_then(|v| v.as_str()))
                .map(str::to_string)
        })
        .collect()
}

/// Every tool call of a `requires_action`. The run only resumes once all of
/// them are answered, so one unusable entry rejects the whole batch.
fn tool_call_requests(data: &serde_json::Value) -> Result<Vec<ToolCallRequest>, String> {
    let Some(action) = data.get("required_action") else {
        return Err("missing required_action".to_string());
    };
    let action_type = action.get("type").and_then(|t| t.as_str());
    if action_type != Some("submit_tool_outputs") {
        return Err(format!("unsupported required_action type {action_type:?}"));
    }
    let calls = action
        .pointer("/submit_tool_outputs/tool_calls")
        .and_then(|c| c.as_array())
        .filter(|calls| !calls.is_empty())
        .ok_or_else(|| "no tool calls to answer".to_string())?;

    calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            let call_id = call.get("id").and_then(|v| v.as_str());
            let tool_name = call.pointer("/function/name").and_then(|v| v.as_str());
            let (Some(call_id), Some(tool_name)) = (call_id, tool_name) else {
                return Err(format!("tool call {index} has no id or function name"));
            };
            let arguments = match call.pointer("/function/arguments") {
                Some(serde_json::Value::String(s)) => s.clone(),
                Some(serde_json::Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Ok(ToolCallRequest {
                call_id: call_id.to_string(),
                tool_name: tool_name.to_string(),
                arguments,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn classify_all(events: &[RawEvent], identity: &mut RunIdentity) -> Vec<TypedEvent> {
        events
            .iter()
            .flat_map(|raw| classify(raw, identity))
            .collect()
    }

    fn text_of(events: &[TypedEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                TypedEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn text_parts_within_one_delta_keep_array_order() {
        let raw = RawEvent::new(
            "thread.message.delta",
            json!({ "delta": { "content": [{ "text": "Hel" }, { "text": "lo" }] } }),
        );
        let events = classify(&raw, &mut RunIdentity::default());

        assert_eq!(
            events,
            vec![
                TypedEvent::TextDelta { text: "Hel".into() },
                TypedEvent::TextDelta { text: "lo".into() },
            ]
        );
        assert_eq!(text_of(&events), "Hello");
    }

    #[test]
    fn provider_text_shape_with_value_is_understood() {
        let raw = RawEvent::new(
            "thread.message.delta",
            json!({ "delta": { "content": [
                { "index": 0, "type": "text", "text": { "value": "Good ", "annotations": [] } },
                { "index": 1, "type": "image_file", "image_file": { "file_id": "f" } },
                { "index": 2, "type": "text", "text": { "value": "morning" } },
            ] } }),
        );
        let events = classify(&raw, &mut RunIdentity::default());
        assert_eq!(text_of(&events), "Good morning");
        assert_eq!(events.len(), 2);
    }

    #[test]
    fn events_across_deltas_preserve_input_order() {
        let events = vec![
            RawEvent::new("thread.run.created", json!({ "id": "run_1" })),
            RawEvent::new("thread.message.created", json!({})),
            RawEvent::new("thread.message.delta", json!({ "delta": { "content": [{ "text": "a" }] } })),
            RawEvent::new("thread.message.delta", json!({ "delta": { "content": [{ "text": "b" }, { "text": "c" }] } })),
            RawEvent::new("thread.run.completed", json!({})),
        ];
        let mut identity = RunIdentity::default();
        let typed = classify_all(&events, &mut identity);

        assert_eq!(
            typed,
            vec![
                TypedEvent::RunCreated { run_id: "run_1".into() },
                TypedEvent::Info { event: "thread.message.created".into() },
                TypedEvent::TextDelta { text: "a".into() },
                TypedEvent::TextDelta { text: "b".into() },
                TypedEvent::TextDelta { text: "c".into() },
                TypedEvent::Info { event: "thread.run.completed".into() },
            ]
        );
        assert_eq!(identity.run_id(), Some("run_1"));
    }

    #[test]
    fn thread_created_sets_identity_once() {
        let mut identity = RunIdentity::default();
        let first = classify(&RawEvent::new("thread.created", json!({ "id": "t1" })), &mut identity);
        assert_eq!(first, vec![TypedEvent::ThreadCreated { thread_id: "t1".into() }]);

        let ignored = classify(&RawEvent::new("thread.created", json!({ "id": "t2" })), &mut identity);
        assert_eq!(ignored, vec![TypedEvent::ThreadCreated { thread_id: "t1".into() }]);
        classify(&RawEvent::new("thread.run.created", json!({ "id": "run_9", "thread_id": "t3" })), &mut identity);

        assert_eq!(identity.thread_id(), Some("t1"));
        assert_eq!(identity.run_id(), Some("run_9"));
    }

    #[test]
    fn requires_action_yields_one_request_per_call_in_listed_order() {
        let raw = RawEvent::new(
            "thread.run.requires_action",
            json!({
                "id": "run_1",
                "required_action": {
                    "type": "submit_tool_outputs",
                    "submit_tool_outputs": { "tool_calls": [
                        { "id": "b", "type": "function", "function": { "name": "bar", "arguments": "{}" } },
                        { "id": "a", "type": "function", "function": { "name": "foo", "arguments": "{\"x\":1}" } },
                    ] }
                }
            }),
        );
        let events = classify(&raw, &mut RunIdentity::default());

        assert_eq!(
            events,
            vec![
                TypedEvent::ToolCallRequest(ToolCallRequest {
                    call_id: "b".into(),
                    tool_name: "bar".into(),
                    arguments: "{}".into(),
                }),
                TypedEvent::ToolCallRequest(ToolCallRequest {
                    call_id: "a".into(),
                    tool_name: "foo".into(),
                    arguments: "{\"x\":1}".into(),
                }),
            ]
        );
    }

    #[test]
    fn run_failed_carries_provider_data() {
        let mut identity = RunIdentity::default();
        classify(&RawEvent::new("thread.run.created", json!({ "id": "run_1" })), &mut identity);
        let events = classify(
            &RawEvent::new("thread.run.failed", json!({ "code": "rate_limit" })),
            &mut identity,
        );

        assert_eq!(events, vec![TypedEvent::RunFailed { detail: json!({ "code": "rate_limit" }) }]);
        assert_eq!(identity.run_id(), Some("run_1"));
    }

    #[test]
    fn unknown_and_unmappable_events_degrade_to_info() {
        let mut identity = RunIdentity::default();
        let cases = vec![
            RawEvent::new("thread.run.step.delta", json!({})),
            RawEvent::new("thread.created", json!({})),
            RawEvent::new("thread.message.delta", json!({ "delta": { "content": [] } })),
        ];
        for raw in cases {
            assert_eq!(
                classify(&raw, &mut identity),
                vec![TypedEvent::Info { event: raw.event.clone() }]
            );
        }
        assert_eq!(identity, RunIdentity::default());
    }

    #[test]
    fn unanswerable_requires_action_is_malformed() {
        let action = |required_action: serde_json::Value| {
            RawEvent::new(
                "thread.run.requires_action",
                json!({ "id": "run_1", "required_action": required_action }),
            )
        };
        let cases = vec![
            action(json!({ "type": "other" })),
            action(json!({ "type": "submit_tool_outputs", "submit_tool_outputs": { "tool_calls": [] } })),
            action(json!({ "type": "submit_tool_outputs", "submit_tool_outputs": { "tool_calls": [
                { "id": "a", "type": "function", "function": { "name": "foo", "arguments": "{}" } },
                { "type": "function", "function": { "name": "bar", "arguments": "{}" } },
            ] } })),
            RawEvent::new("thread.run.requires_action", json!({ "id": "run_1" })),
        ];
        for raw in cases {
            let events = classify(&raw, &mut RunIdentity::default());
            assert_eq!(events.len(), 1, "{raw:?}");
            assert!(
                matches!(&events[0], TypedEvent::Malformed { event, .. } if event == "thread.run.requires_action"),
                "{events:?}"
            );
        }
    }
}
