//! Stream one reply from the configured provider.
//!
//! Usage:
//!   export OPENAI_API_KEY=sk-your-key
//!   cargo run --example basic_stream -- "Why is the sky blue?"

use chat_bridge::{BridgeConfig, ChatClient, ChatMessage, ChatRequest, StreamItem};
use futures::StreamExt;
use std::io::Write;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let prompt = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Say hello in three languages.".to_string());

    let config = BridgeConfig::find_and_load(None)
        .unwrap_or_else(|_| BridgeConfig::for_provider("openai", "gpt-4o-mini"));
    println!(
        "Provider: {} ({}, {})",
        config.provider.name,
        config.effective_base_url()?,
        config.effective_format()
    );

    let client = ChatClient::new(config)?;
    let request = ChatRequest::new(vec![
        ChatMessage::system("Be concise."),
        ChatMessage::user(prompt),
    ]);

    let mut stream = client.stream(&request).await?;
    while let Some(item) = stream.next().await {
        match item? {
            StreamItem::Chunk(chunk) => {
                print!("{}", chunk.content());
                std::io::stdout().flush()?;
            }
            StreamItem::ToolCall(call) => println!("\n[tool call] {}({})", call.name, call.args),
        }
    }
    println!();
    Ok(())
}
