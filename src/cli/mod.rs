//! CLI entry point for threadrun.

pub mod tools;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// threadrun CLI
#[derive(Parser, Debug)]
#[command(name = "threadrun", version, about = "Chat with a remote assistant through threads and runs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one message to the assistant and stream the reply
    Chat(ChatArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Continue an existing thread
    #[arg(long)]
    pub thread: Option<String>,

    /// Assistant id (overrides ASSISTANT_ID)
    #[arg(short, long)]
    pub assistant: Option<String>,

    /// Model override for the run
    #[arg(short, long)]
    pub model: Option<String>,

    /// Instructions override for the run
    #[arg(short, long)]
    pub instructions: Option<String>,

    /// Print every event as one JSON line
    #[arg(long)]
    pub ndjson: bool,

    /// Config file (defaults to the platform config dir)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// User message (positional)
    pub prompt: Option<String>,
}

impl Cli {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
