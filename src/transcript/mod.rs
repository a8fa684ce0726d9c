//! Accumulated conversation transcript for one turn.

pub mod store;

pub use store::{ChatRecord, ChatStore, MemoryChatStore};

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ToolCallRequest;

/// Conversation role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// A single part of message content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallPart {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolResultPart {
    pub call_id: String,
    /// Exactly what was submitted to the provider.
    pub output: String,
    pub is_error: bool,
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
    /// Run that produced this message (assistant and tool entries).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TranscriptMessage {
    fn new(role: Role, content: Vec<ContentPart>, run_id: Option<&str>) -> Self {
        Self {
            role,
            content,
            run_id: run_id.map(str::to_string),
            timestamp: Some(Utc::now()),
        }
    }

    /// Concatenated text parts.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_calls(&self) -> Vec<&ToolCallPart> {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }
}

/// Ordered record of a turn: user message, assistant text per run, tool
/// calls and tool results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<TranscriptMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(TranscriptMessage::new(
            Role::User,
            vec![ContentPart::Text { text: text.into() }],
            None,
        ));
    }

    /// Append streamed assistant text, merging consecutive deltas of one run.
    pub fn push_assistant_text(&mut self, run_id: Option<&str>, text: &str) {
        if let Some(last) = self.messages.last_mut() {
            if last.role == Role::Assistant && last.run_id.as_deref() == run_id {
                if let Some(ContentPart::Text { text: existing }) = last.content.last_mut() {
                    existing.push_str(text);
                    return;
                }
            }
        }
        self.messages.push(TranscriptMessage::new(
            Role::Assistant,
            vec![ContentPart::Text { text: text.to_string() }],
            run_id,
        ));
    }

    pub fn push_tool_calls(&mut self, run_id: Option<&str>, calls: &[ToolCallRequest]) {
        if calls.is_empty() {
            return;
        }
        let parts = calls
            .iter()
            .map(|call| {
                ContentPart::ToolCall(ToolCallPart {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    arguments: call.arguments.clone(),
                })
            })
            .collect();
        self.messages
            .push(TranscriptMessage::new(Role::Assistant, parts, run_id));
    }

    pub fn push_tool_result(
        &mut self,
        run_id: Option<&str>,
        call_id: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) {
        self.messages.push(TranscriptMessage::new(
            Role::Tool,
            vec![ContentPart::ToolResult(ToolResultPart {
                call_id: call_id.into(),
                output: output.into(),
                is_error,
            })],
            run_id,
        ));
    }

    pub fn messages(&self) -> &[TranscriptMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<TranscriptMessage> {
        self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// All assistant text of the turn, in order.
    pub fn assistant_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(TranscriptMessage::text)
            .collect()
    }

    /// Copy without tool calls that never received a result. Messages left
    /// empty by the stripping are dropped.
    pub fn without_incomplete_tool_calls(&self) -> Transcript {
        let answered: HashSet<&str> = self
            .messages
            .iter()
            .flat_map(|m| m.content.iter())
            .filter_map(|part| match part {
                ContentPart::ToolResult(result) => Some(result.call_id.as_str()),
                _ => None,
            })
            .collect();

        let messages = self
            .messages
            .iter()
            .filter_map(|message| {
                let content: Vec<ContentPart> = message
                    .content
                    .iter()
                    .filter(|part| match part {
                        ContentPart::ToolCall(call) => answered.contains(call.call_id.as_str()),
                        _ => true,
                    })
                    .cloned()
                    .collect();
                if content.is_empty() {
                    return None;
                }
                Some(TranscriptMessage {
                    content,
                    ..message.clone()
                })
            })
            .collect();
        Transcript { messages }
    }
}
