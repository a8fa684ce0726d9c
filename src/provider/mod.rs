//! Remote assistant provider boundary.

pub mod http;
pub mod openai_assistants;
pub mod sse;

use async_trait::async_trait;
use bon::Builder;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::classify::RawEvent;
use crate::error::ThreadRunError;

pub use openai_assistants::OpenAiAssistantsProvider;

/// Raw provider events for one run, in emission order.
pub type RawEventStream = BoxStream<'static, Result<RawEvent, ThreadRunError>>;

/// Id of a message appended to a thread.
pub type MessageId = String;

/// Tool definition advertised to the remote assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Assistants API `{"type":"function","function":{..}}` shape.
    pub fn to_function_tool(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// One answered tool call, submitted back to unblock a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    #[serde(rename = "tool_call_id")]
    pub call_id: String,
    pub output: String,
}

/// Per-run options sent with every run creation.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct RunSettings {
    #[builder(into)]
    pub model: Option<String>,
    #[builder(into)]
    pub instructions: Option<String>,
    #[builder(into)]
    pub additional_instructions: Option<String>,
    #[builder(default)]
    pub tools: Vec<ToolDefinition>,
}

impl RunSettings {
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// Thread/run API consumed by the orchestrator.
///
/// Every operation that starts or resumes a run returns that run's event
/// stream. Implementations never retry.
#[async_trait]
pub trait AssistantProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    /// Create a new thread seeded with `user_message` and start a run on it.
    async fn create_thread_and_run(
        &self,
        user_message: &str,
        settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError>;

    /// Append a user message to an existing thread.
    async fn add_message(
        &self,
        thread_id: &str,
        user_message: &str,
    ) -> Result<MessageId, ThreadRunError>;

    async fn create_run(
        &self,
        thread_id: &str,
        settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError>;

    /// Submit the complete output set for a `requires_action` run.
    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RawEventStream, ThreadRunError>;
}
