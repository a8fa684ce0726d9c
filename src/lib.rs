//! threadrun: run orchestration for thread/run assistant APIs
//!
//! Drives a tool-augmented conversation turn against a remote assistant that
//! only talks through event streams: classifies raw events, streams assistant
//! text to the client, answers tool calls and resumes the run until done.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use threadrun::prelude::*;
//!
//! # async fn example() -> threadrun::error::Result<()> {
//! let config = ThreadRunConfig::load(None)?;
//! let provider = Arc::new(OpenAiAssistantsProvider::from_config(&config)?);
//! let orchestrator = RunOrchestrator::new(provider, Arc::new(ToolRegistry::new()))
//!     .with_config(&config);
//!
//! let mut handle = orchestrator.spawn_turn(TurnRequest::new("What's on my calendar?"));
//! if let Some(events) = handle.take_events() {
//!     for message in events.collect_all().await {
//!         println!("{}", message.to_json_line());
//!     }
//! }
//! let outcome = handle.wait().await;
//! println!("thread: {:?}", outcome.thread_id);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod classify;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prelude;
pub mod provider;
pub mod tools;
pub mod transcript;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
