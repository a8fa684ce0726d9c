//! OpenAI Assistants v2 (threads and runs) provider.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::http::{assistants_headers, build_client, status_to_error};
use super::sse::response_event_stream;
use super::{AssistantProvider, MessageId, RawEventStream, RunSettings, ToolOutput};
use crate::config::ThreadRunConfig;
use crate::error::ThreadRunError;
use crate::util::with_timeout;

/// HTTP client for the Assistants streaming endpoints.
pub struct OpenAiAssistantsProvider {
    client: reqwest::Client,
    api_key: String,
    organization: Option<String>,
    assistant_id: String,
    base_url: String,
    /// Bound on waiting for response headers, and for whole non-streaming bodies.
    request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct CreatedMessage {
    id: String,
}

impl OpenAiAssistantsProvider {
    pub fn new(
        api_key: impl Into<String>,
        assistant_id: impl Into<String>,
        base_url: Option<String>,
    ) -> Result<Self, ThreadRunError> {
        let defaults = ThreadRunConfig::default();
        Ok(Self {
            client: build_client(defaults.request_timeout())?,
            request_timeout: defaults.request_timeout(),
            api_key: api_key.into(),
            organization: None,
            assistant_id: assistant_id.into(),
            base_url: base_url
                .unwrap_or(defaults.base_url)
                .trim_end_matches('/')
                .to_string(),
        })
    }

    /// Build from validated configuration.
    pub fn from_config(config: &ThreadRunConfig) -> Result<Self, ThreadRunError> {
        config.validate()?;
        let api_key = config.api_key.clone().unwrap_or_default();
        let assistant_id = config.assistant_id.clone().unwrap_or_default();
        Ok(Self {
            client: build_client(config.request_timeout())?,
            request_timeout: config.request_timeout(),
            api_key,
            organization: config.organization.clone(),
            assistant_id,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn assistant_id(&self) -> &str {
        &self.assistant_id
    }

    fn run_body(&self, settings: &RunSettings) -> Value {
        let mut body = json!({
            "assistant_id": self.assistant_id,
            "stream": true,
        });
        if let Some(model) = &settings.model {
            body["model"] = json!(model);
        }
        if let Some(instructions) = &settings.instructions {
            body["instructions"] = json!(instructions);
        }
        if let Some(extra) = &settings.additional_instructions {
            body["additional_instructions"] = json!(extra);
        }
        if !settings.tools.is_empty() {
            body["tools"] = Value::Array(
                settings
                    .tools
                    .iter()
                    .map(|tool| tool.to_function_tool())
                    .collect(),
            );
        }
        body
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, ThreadRunError> {
        let url = format!("{}{}", self.base_url, path);
        let request = self
            .client
            .post(&url)
            .headers(assistants_headers(&self.api_key, self.organization.as_deref())?)
            .json(body);
        let resp = with_timeout(Some(self.request_timeout), async {
            Ok(request.send().await?)
        })
        .await?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body_text));
        }
        Ok(resp)
    }

    async fn post_stream(&self, path: &str, body: &Value) -> Result<RawEventStream, ThreadRunError> {
        let resp = self.post(path, body).await?;
        Ok(response_event_stream(resp))
    }
}

#[async_trait]
impl AssistantProvider for OpenAiAssistantsProvider {
    fn provider_name(&self) -> &str {
        "openai-assistants"
    }

    async fn create_thread_and_run(
        &self,
        user_message: &str,
        settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError> {
        let mut body = self.run_body(settings);
        body["thread"] = json!({
            "messages": [{ "role": "user", "content": user_message }],
        });
        // additional_instructions is only accepted on runs of an existing thread.
        if let Some(obj) = body.as_object_mut() {
            obj.remove("additional_instructions");
        }
        debug!(assistant_id = %self.assistant_id, "create thread and run");
        self.post_stream("/threads/runs", &body).await
    }

    async fn add_message(
        &self,
        thread_id: &str,
        user_message: &str,
    ) -> Result<MessageId, ThreadRunError> {
        let body = json!({ "role": "user", "content": user_message });
        debug!(thread_id, "add message");
        let resp = self
            .post(&format!("/threads/{thread_id}/messages"), &body)
            .await?;
        let created: CreatedMessage = with_timeout(Some(self.request_timeout), async {
            Ok(resp.json().await?)
        })
        .await?;
        Ok(created.id)
    }

    async fn create_run(
        &self,
        thread_id: &str,
        settings: &RunSettings,
    ) -> Result<RawEventStream, ThreadRunError> {
        let body = self.run_body(settings);
        debug!(thread_id, assistant_id = %self.assistant_id, "create run");
        self.post_stream(&format!("/threads/{thread_id}/runs"), &body)
            .await
    }

    async fn submit_tool_outputs(
        &self,
        thread_id: &str,
        run_id: &str,
        outputs: Vec<ToolOutput>,
    ) -> Result<RawEventStream, ThreadRunError> {
        let body = json!({ "tool_outputs": outputs, "stream": true });
        debug!(thread_id, run_id, count = outputs_len(&body), "submit tool outputs");
        self.post_stream(
            &format!("/threads/{thread_id}/runs/{run_id}/submit_tool_outputs"),
            &body,
        )
        .await
    }
}

fn outputs_len(body: &Value) -> usize {
    body["tool_outputs"].as_array().map_or(0, Vec::len)
}

impl std::fmt::Debug for OpenAiAssistantsProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiAssistantsProvider")
            .field("assistant_id", &self.assistant_id)
            .field("base_url", &self.base_url)
            .finish()
    }
}
