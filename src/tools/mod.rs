//! Tool registry: named, schema-validated callables for the remote assistant.

pub mod arguments;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use registry::ToolRegistry;
pub use tool::{FnTool, ProgressSink, Tool, ToolExecutionContext};
pub use types::{ParameterBuilder, ToolParameters};
