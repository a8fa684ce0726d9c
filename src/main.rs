//! threadrun CLI binary entry point.

use std::io::Write;
use std::sync::Arc;

use futures::StreamExt;
use threadrun::channel::OutputMessage;
use threadrun::cli::{ChatArgs, Cli, Commands};
use threadrun::config::ThreadRunConfig;
use threadrun::orchestrator::{RunOrchestrator, TurnRequest, TurnStatus};
use threadrun::provider::{OpenAiAssistantsProvider, RunSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("threadrun=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse_args();

    let result = match cli.command {
        Commands::Chat(chat_args) => handle_chat(chat_args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prompt = match args.prompt {
        Some(p) => p,
        None => {
            eprintln!("Usage: threadrun chat \"your message here\"");
            std::process::exit(1);
        }
    };

    let mut config = ThreadRunConfig::load(args.config.as_deref())?;
    if let Some(assistant) = args.assistant {
        config.assistant_id = Some(assistant);
    }

    let provider = Arc::new(OpenAiAssistantsProvider::from_config(&config)?);
    let tools = Arc::new(threadrun::cli::tools::demo_registry()?);
    let orchestrator = RunOrchestrator::new(provider, tools).with_config(&config);

    let settings = RunSettings::builder()
        .maybe_model(args.model)
        .maybe_instructions(args.instructions)
        .build();
    let mut request = TurnRequest::new(prompt).with_settings(settings);
    if let Some(thread) = args.thread {
        request = request.with_thread(thread);
    }

    let mut handle = orchestrator.spawn_turn(request);
    let mut events = handle
        .take_events()
        .ok_or("turn events already taken")?;

    let cancel = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nCanceling...");
            cancel.cancel();
        }
    });

    let mut stdout = std::io::stdout();
    while let Some(message) = events.next().await {
        if args.ndjson {
            writeln!(stdout, "{}", message.to_json_line())?;
            continue;
        }
        match message {
            OutputMessage::AssistantText { content } => {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            OutputMessage::ToolProgress {
                tool_name, payload, ..
            } => {
                eprintln!("\n[{tool_name}] {payload}");
            }
            OutputMessage::Error { message, .. } => eprintln!("\nError: {message}"),
            OutputMessage::RunFailed { detail } => eprintln!("\nRun failed: {detail}"),
            OutputMessage::GlobalError { detail } => eprintln!("\nError: {detail}"),
            OutputMessage::Event { .. } | OutputMessage::Finish { .. } => {}
        }
    }

    let outcome = handle.wait().await;
    if !args.ndjson {
        println!(); // newline after streaming
        if let Some(thread_id) = &outcome.thread_id {
            eprintln!("thread: {thread_id}");
        }
    }

    match outcome.status {
        TurnStatus::Failed { error } => Err(error.into()),
        TurnStatus::Completed | TurnStatus::Canceled => Ok(()),
    }
}
