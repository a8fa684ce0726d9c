//! HTTP client construction, headers and status mapping.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::ThreadRunError;

const ASSISTANTS_BETA: &str = "assistants=v2";

/// Build a client for one provider instance.
///
/// Only connecting is bounded here. A client-wide `timeout` would also cover
/// reading the body and cut off long-lived run streams; callers bound the
/// wait for response headers themselves and the orchestrator bounds each
/// stream event.
pub fn build_client(connect_timeout: Duration) -> Result<reqwest::Client, ThreadRunError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| ThreadRunError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Bearer auth plus the Assistants beta header.
pub fn assistants_headers(
    api_key: &str,
    organization: Option<&str>,
) -> Result<HeaderMap, ThreadRunError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert("OpenAI-Beta", HeaderValue::from_static(ASSISTANTS_BETA));
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| ThreadRunError::Configuration("API key is not a valid header value".into()))?;
    headers.insert(AUTHORIZATION, auth);
    if let Some(org) = organization {
        let val = HeaderValue::from_str(org).map_err(|_| {
            ThreadRunError::Configuration("organization is not a valid header value".into())
        })?;
        headers.insert("OpenAI-Organization", val);
    }
    Ok(headers)
}

/// Map a non-2xx response to an error.
pub fn status_to_error(status: u16, body: &str) -> ThreadRunError {
    match status {
        401 | 403 => ThreadRunError::Authentication(error_message(body)),
        429 => ThreadRunError::RateLimited {
            retry_after_ms: extract_retry_after(body),
        },
        _ => ThreadRunError::api(status, error_message(body)),
    }
}

/// Prefer `error.message` from a JSON body, else the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string())
}

fn extract_retry_after(body: &str) -> Option<u64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("retry_after"))
                .and_then(|r| r.as_f64())
                .map(|s| (s * 1000.0) as u64)
        })
}
