//! Error classification and tool failure types.

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Broad error category, reported to clients alongside error events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Configuration,
    Serialization,
    Stream,
    ToolExecution,
    Canceled,
    Unknown,
}

/// Failure of a single tool invocation.
///
/// Always recovered: the orchestrator turns it into an error payload for the
/// remote run instead of aborting the batch.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Tool '{0}' not found")]
    UnknownTool(String),

    #[error("Invalid arguments for '{tool_name}': {message}")]
    InvalidArguments { tool_name: String, message: String },

    #[error("Tool '{tool_name}' failed: {message}")]
    Execution { tool_name: String, message: String },

    #[error("Tool '{tool_name}' panicked: {message}")]
    Panicked { tool_name: String, message: String },
}

impl ToolError {
    /// Payload submitted to the provider in place of a tool output.
    pub fn to_output_payload(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}
