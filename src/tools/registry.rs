//! Catalogue of tools available to the remote assistant.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;

use super::arguments::ToolArguments;
use super::tool::{FnTool, Tool, ToolExecutionContext};
use super::types::ToolParameters;
use super::validation::validate_arguments;
use crate::error::{ThreadRunError, ToolError};
use crate::provider::ToolDefinition;
use crate::util::panic_message;

/// Name-indexed set of tools.
///
/// Built once at startup, then shared read-only (`Arc<ToolRegistry>`) across
/// every concurrent conversation.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    by_name: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A duplicate name is a configuration error.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ThreadRunError> {
        let name = tool.name().to_string();
        if name.is_empty() {
            return Err(ThreadRunError::Configuration(
                "tool name must not be empty".to_string(),
            ));
        }
        if self.by_name.contains_key(&name) {
            return Err(ThreadRunError::Configuration(format!(
                "tool '{name}' is already registered"
            )));
        }
        self.by_name.insert(name, self.tools.len());
        self.tools.push(tool);
        Ok(())
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ToolParameters,
        executor: F,
    ) -> Result<(), ThreadRunError>
    where
        F: Fn(ToolArguments, ToolExecutionContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ThreadRunError>> + Send + 'static,
    {
        self.register(Arc::new(FnTool::new(name, description, parameters, executor)))
    }

    /// Builder-style [`register`](Self::register).
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Result<Self, ThreadRunError> {
        self.register(tool)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.by_name.get(name).map(|&idx| &self.tools[idx])
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|t| t.name())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Definitions to advertise to the provider, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }

    /// Parse, validate and execute one tool call.
    ///
    /// No timeout is applied here. A panicking executor is reported as
    /// [`ToolError::Panicked`] rather than unwinding into the caller.
    pub async fn invoke(
        &self,
        name: &str,
        raw_arguments: &str,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value, ToolError> {
        let tool = self
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        let args = ToolArguments::parse(raw_arguments).map_err(|e| ToolError::InvalidArguments {
            tool_name: name.to_string(),
            message: e.to_string(),
        })?;
        validate_arguments(args.raw(), &tool.parameters().schema).map_err(|message| {
            ToolError::InvalidArguments {
                tool_name: name.to_string(),
                message,
            }
        })?;

        match AssertUnwindSafe(tool.execute(&args, ctx)).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => Err(ToolError::Execution {
                tool_name: name.to_string(),
                message: err.to_string(),
            }),
            Err(panic) => Err(ToolError::Panicked {
                tool_name: name.to_string(),
                message: panic_message(panic.as_ref()),
            }),
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
