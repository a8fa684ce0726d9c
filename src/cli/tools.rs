//! Demo tools registered by `threadrun chat`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ThreadRunError;
use crate::provider::http::status_to_error;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters, ToolRegistry};

pub const OPEN_METEO_URL: &str = "https://api.open-meteo.com/v1";

/// Registry with `search_emails` and `get_weather`.
pub fn demo_registry() -> Result<ToolRegistry, ThreadRunError> {
    let mut registry = ToolRegistry::new();
    registry.register_fn(
        "search_emails",
        "Search emails by query",
        ToolParameters::object()
            .string("query", "Search query", true)
            .build(),
        |args, ctx| async move {
            let query = args.get_str("query")?.to_string();
            ctx.report_progress(json!({ "status": "searching", "query": query }))
                .await;
            Ok(json!([format!("Email for query=\"{query}\"")]))
        },
    )?;
    registry.register(Arc::new(WeatherTool::new(OPEN_METEO_URL)))?;
    Ok(registry)
}

/// Current weather from the Open-Meteo forecast API.
pub struct WeatherTool {
    client: reqwest::Client,
    base_url: String,
    parameters: ToolParameters,
}

impl WeatherTool {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            parameters: ToolParameters::object()
                .number("latitude", "Latitude in degrees", true)
                .number("longitude", "Longitude in degrees", true)
                .build(),
        }
    }
}

#[async_trait]
impl Tool for WeatherTool {
    fn name(&self) -> &str {
        "get_weather"
    }

    fn description(&self) -> &str {
        "Get the current weather at a location"
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolExecutionContext,
    ) -> Result<Value, ThreadRunError> {
        let latitude = args.get_f64("latitude")?;
        let longitude = args.get_f64("longitude")?;
        let resp = self
            .client
            .get(format!("{}/forecast", self.base_url))
            .query(&[
                ("latitude", latitude.to_string()),
                ("longitude", longitude.to_string()),
                ("current", "temperature_2m".to_string()),
                ("hourly", "temperature_2m".to_string()),
                ("daily", "sunrise,sunset".to_string()),
                ("timezone", "auto".to_string()),
            ])
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_to_error(status.as_u16(), &body));
        }
        Ok(resp.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_emails_returns_canned_result() {
        let registry = demo_registry().unwrap();
        let out = registry
            .invoke(
                "search_emails",
                r#"{"query":"invoice"}"#,
                &ToolExecutionContext::new("call_1", "search_emails"),
            )
            .await
            .unwrap();
        assert_eq!(out, json!(["Email for query=\"invoice\""]));
    }

    #[tokio::test]
    async fn weather_queries_forecast_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/forecast"))
            .and(query_param("latitude", "52.52"))
            .and(query_param("current", "temperature_2m"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "current": { "temperature_2m": 11.5 } })),
            )
            .mount(&server)
            .await;

        let tool = WeatherTool::new(server.uri());
        let args = ToolArguments::parse(r#"{"latitude":52.52,"longitude":13.41}"#).unwrap();
        let out = tool
            .execute(&args, &ToolExecutionContext::default())
            .await
            .unwrap();
        assert_eq!(out["current"]["temperature_2m"], 11.5);
    }
}
