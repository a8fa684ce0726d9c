//! Typed access to parsed tool arguments.

use crate::error::ThreadRunError;

/// Parsed tool arguments with typed getters.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Parse the opaque argument string a provider sends with a tool call.
    ///
    /// An empty (or whitespace-only) string is treated as `{}`.
    pub fn parse(raw: &str) -> Result<Self, ThreadRunError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::new(serde_json::json!({})));
        }
        let value = serde_json::from_str(trimmed).map_err(|e| {
            ThreadRunError::InvalidArgument(format!("arguments are not valid JSON: {e}"))
        })?;
        Ok(Self::new(value))
    }

    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, ThreadRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| ThreadRunError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64, ThreadRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| ThreadRunError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64, ThreadRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ThreadRunError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, ThreadRunError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| ThreadRunError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    /// Deserialize the whole argument object into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, ThreadRunError> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            ThreadRunError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}
