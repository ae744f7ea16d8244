use anyhow::Context;
use bytes::Bytes;
use chat_bridge::config::config_search_paths;
use chat_bridge::format::canonical_types::ChatMessage;
use chat_bridge::stream::{transport_events, ReasoningTokens};
use chat_bridge::{
    normalize, BridgeConfig, ChatClient, ChatRequest, FormatKind, SharedTraceLog, StreamItem,
    StreamSession,
};
use clap::{Parser, Subcommand};
use futures::{Stream, StreamExt};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "chat-bridge",
    about = "Talk to OpenAI Chat, OpenAI Responses and Anthropic Messages through one shape",
    version
)]
struct Cli {
    /// Print config search paths and exit
    #[arg(long)]
    show_config_paths: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one prompt and print the reply
    Chat {
        prompt: String,

        /// Path to config file (TOML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Provider name (overrides config)
        #[arg(long)]
        provider: Option<String>,

        /// Wire format (overrides config)
        #[arg(long)]
        format: Option<FormatKind>,

        /// Model (overrides config)
        #[arg(short, long)]
        model: Option<String>,

        /// System prompt
        #[arg(short, long)]
        system: Option<String>,

        /// Wait for the full response instead of streaming
        #[arg(long)]
        no_stream: bool,
    },
    /// Run a captured SSE transcript through the streaming pipeline offline
    Replay {
        file: PathBuf,

        /// Wire format the transcript was captured from
        #[arg(short, long)]
        format: FormatKind,

        /// Append a JSONL trace of every event to this file
        #[arg(long)]
        trace_log: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chat_bridge=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if cli.show_config_paths {
        println!("Config search paths:");
        for (i, path) in config_search_paths().iter().enumerate() {
            println!("  {}. {}", i + 1, path.display());
        }
        return Ok(());
    }

    match cli.command {
        Some(Command::Chat {
            prompt,
            config,
            provider,
            format,
            model,
            system,
            no_stream,
        }) => {
            let mut config = BridgeConfig::find_and_load(config.as_deref())?;
            if let Some(provider) = provider {
                config.provider.name = provider;
                config.provider.base_url = None;
                config.provider.api_key_env = None;
            }
            if format.is_some() {
                config.provider.format = format;
            }
            if let Some(model) = model {
                config.provider.model = model;
            }
            chat(config, prompt, system, no_stream).await
        }
        Some(Command::Replay {
            file,
            format,
            trace_log,
        }) => replay(file, format, trace_log).await,
        None => {
            println!("Nothing to do. Try `chat-bridge chat \"hello\"` or `chat-bridge --help`.");
            Ok(())
        }
    }
}

async fn chat(
    config: BridgeConfig,
    prompt: String,
    system: Option<String>,
    no_stream: bool,
) -> anyhow::Result<()> {
    let base_url = config.effective_base_url()?;
    info!("  Provider:  {}", config.provider.name);
    info!("  Base URL:  {}", base_url);
    info!("  Format:    {}", config.effective_format());
    info!("  Model:     {}", config.provider.model);

    let client = ChatClient::new(config)?;

    let mut messages = Vec::new();
    if let Some(system) = system {
        messages.push(ChatMessage::system(system));
    }
    messages.push(ChatMessage::user(prompt));
    let request = ChatRequest::new(messages);

    if no_stream {
        let response = client.complete(&request).await?;
        for choice in &response.choices {
            if let Some(reasoning) = &choice.message.reasoning {
                eprintln!("[reasoning] {reasoning}");
            }
            if let Some(content) = &choice.message.content {
                println!("{content}");
            }
            for call in choice.message.tool_calls.iter().flatten() {
                println!("[tool call] {}({})", call.name, call.arguments);
            }
        }
        return Ok(());
    }

    let stream = client.stream(&request).await?;
    render(stream).await
}

async fn replay(
    file: PathBuf,
    format: FormatKind,
    trace_log: Option<PathBuf>,
) -> anyhow::Result<()> {
    let transcript = std::fs::read(&file)
        .with_context(|| format!("failed to read transcript {}", file.display()))?;

    let mut session = StreamSession::new(format.adapter(), ReasoningTokens::default());
    if let Some(path) = trace_log {
        session = session.with_trace(SharedTraceLog::open(path)?);
    }

    let body = futures::stream::iter([Ok::<_, std::io::Error>(Bytes::from(transcript))]);
    render(normalize(transport_events(body), session)).await
}

/// Print content to stdout as it arrives; reasoning and errors go to stderr.
async fn render(
    stream: impl Stream<Item = chat_bridge::Result<StreamItem>>,
) -> anyhow::Result<()> {
    futures::pin_mut!(stream);
    let mut stdout = std::io::stdout();
    let mut in_reasoning = false;

    while let Some(item) = stream.next().await {
        match item {
            Ok(StreamItem::Chunk(chunk)) => {
                let reasoning = chunk.reasoning();
                if !reasoning.is_empty() {
                    if !in_reasoning {
                        eprint!("[reasoning] ");
                        in_reasoning = true;
                    }
                    eprint!("{reasoning}");
                }
                let content = chunk.content();
                if !content.is_empty() {
                    if in_reasoning {
                        eprintln!();
                        in_reasoning = false;
                    }
                    print!("{content}");
                    stdout.flush()?;
                }
            }
            Ok(StreamItem::ToolCall(call)) => {
                println!();
                println!("[tool call] {}({})", call.name, call.args);
            }
            Err(e) => eprintln!("\n[error] {e}"),
        }
    }
    println!();
    Ok(())
}
