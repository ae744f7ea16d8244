//! Use the format adapters and the streaming pipeline without any network calls.
//!
//! Usage:
//!   `cargo run --example translate_only`

use chat_bridge::format::canonical_types::ToolDefinition;
use chat_bridge::stream::ReasoningTokens;
use chat_bridge::{ChatMessage, ChatRequest, FormatKind, JsonObject, JsonValue, StreamSession};

fn main() -> anyhow::Result<()> {
    let mut request = ChatRequest::new(vec![
        ChatMessage::system("You are a geography expert. Be concise."),
        ChatMessage::user("What is the capital of France?"),
        ChatMessage::assistant("The capital of France is Paris."),
        ChatMessage::user("And Germany?"),
    ]);
    request.stream = Some(true);
    request.temperature = Some(0.7);
    request.tools = Some(vec![ToolDefinition {
        name: "lookup_city".to_string(),
        description: Some("Look up facts about a city".to_string()),
        parameters: Some(JsonValue::from(serde_json::json!({
            "type": "object",
            "properties": {"name": {"type": "string"}},
            "required": ["name"]
        }))),
        strict: None,
    }]);

    // The same request in every wire format
    for kind in FormatKind::all() {
        let adapter = kind.adapter();
        let body = adapter.prepare_request(&request, "some-model", &JsonObject::new())?;
        let pretty: serde_json::Value = serde_json::from_slice(&body)?;
        println!("=== {} ({}) ===", kind, adapter.endpoint_path());
        println!("{}", serde_json::to_string_pretty(&pretty)?);
        println!();
    }

    // A canned chat stream with inline reasoning markup and a split tool call
    println!("=== Streaming Demo (openai_chat) ===");
    let mut session = StreamSession::new(FormatKind::OpenAiChat.adapter(), ReasoningTokens::default());
    let events = [
        r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":"<think>Germany's"}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"content":" capital is well known.</think>The capital"}}]}"#,
        r#"data: {"choices":[{"index":0,"delta":{"content":" of Germany is Berlin."}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"lookup_city","arguments":"{\"name\":"}}]}}]}"#,
        r#"{"choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"Berlin\"}"}}]},"finish_reason":"tool_calls"}]}"#,
        "[DONE]",
    ];

    for (i, raw) in events.iter().enumerate() {
        match session.process(raw.as_bytes()) {
            Ok(Some(chunk)) => println!(
                "  event {} -> content={:?} reasoning={:?}",
                i,
                chunk.content(),
                chunk.reasoning()
            ),
            Ok(None) => println!("  event {i} -> (no content)"),
            Err(e) => println!("  event {i} -> error: {e}"),
        }
    }

    for call in session.finish() {
        println!("  tool call -> {}({})", call.name, call.args);
    }

    println!();
    println!("Done! The adapters and pipeline work without any network calls.");
    Ok(())
}
