//! Convenience re-exports for common use.

pub use crate::channel::{output_channel, OutputChannel, OutputMessage, OutputReceiver, TerminalError};
pub use crate::classify::{classify, RawEvent, RunIdentity, TypedEvent};
pub use crate::config::ThreadRunConfig;
pub use crate::error::{Result, ThreadRunError, ToolError};
pub use crate::orchestrator::{RunOrchestrator, TurnHandle, TurnOutcome, TurnRequest, TurnStatus};
pub use crate::provider::{AssistantProvider, OpenAiAssistantsProvider, RunSettings, ToolOutput};
pub use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters, ToolRegistry};
pub use crate::transcript::{ChatRecord, ChatStore, MemoryChatStore, Transcript};
