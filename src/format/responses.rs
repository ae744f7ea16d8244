//! OpenAI Responses adapter (`/responses`), also used for the ChatGPT Codex backend.
//!
//! System messages become `instructions`, every other message becomes a `message`
//! input item with plain-text content. Streaming accepts both the legacy chunk shape
//! and typed event envelopes; see [`OpenAiResponses::parse_streaming_chunk`].

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::json::{JsonObject, JsonValue};

use super::canonical_types::{
    ChatRequest, ChatResponse, Choice, Delta, ResponseMessage, Role, StreamChunk, ToolCall,
    ToolCallFragment, ToolChoice, ToolDefinition, Usage,
};
use super::responses_types::{
    ContentPart, FunctionTool, InputItem, OutputContent, OutputItem, ResponseEnvelope,
    ResponsesEvent, ResponsesRequest, ResponsesResponse, ResponsesStreamChunk, ResponsesToolChoice,
    ResponsesUsage,
};
use super::{finish_body, non_empty, ChatFormat};
use crate::stream::sse::{decode_frame, Frame};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiResponses;

impl ChatFormat for OpenAiResponses {
    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        extra: &JsonObject,
    ) -> Result<Vec<u8>> {
        finish_body(&build_request(request, model)?, extra)
    }

    fn parse_response(&self, data: &[u8]) -> Result<ChatResponse> {
        let resp: ResponsesResponse =
            serde_json::from_slice(data).map_err(|e| BridgeError::decode(e.to_string()))?;
        Ok(convert_response(resp))
    }

    /// A decoded object is first tried as a legacy chunk; if it carries no outputs,
    /// usage, id or model it is re-read as an event envelope keyed on `type`.
    fn parse_streaming_chunk(&self, data: &[u8]) -> Result<Option<StreamChunk>> {
        match decode_frame(data, JsonValue::from_slice)? {
            Frame::Event(value) => classify(&value),
            Frame::Done | Frame::Empty => Ok(None),
        }
    }

    fn endpoint_path(&self) -> &'static str {
        "/responses"
    }

    fn format_name(&self) -> &'static str {
        "openai_responses"
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Build the Responses body, or fail if any message carries non-text content.
pub fn build_request(req: &ChatRequest, model: &str) -> Result<ResponsesRequest> {
    let mut instructions = Vec::new();
    let mut input = Vec::with_capacity(req.messages.len());

    for msg in &req.messages {
        let text = msg.content.text_only().ok_or_else(|| {
            BridgeError::serialization(format!(
                "{} message has non-text content, which the Responses format does not support",
                msg.role.as_str()
            ))
        })?;
        if msg.role == Role::System {
            instructions.push(text);
            continue;
        }
        input.push(InputItem {
            item_type: "message".to_string(),
            role: msg.role.as_str().to_string(),
            content: text,
        });
    }

    if req.stop.is_some() {
        debug!("responses format has no stop sequences; ignoring `stop`");
    }

    let tools: Option<Vec<FunctionTool>> = req
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(translate_tool).collect());
    let has_tools = tools.is_some();

    // tool_choice and parallel_tool_calls only make sense alongside tools.
    let tool_choice = has_tools.then(|| translate_tool_choice(req.tool_choice.as_ref()));
    let parallel_tool_calls = req.parallel_tool_calls.or(has_tools.then_some(true));

    Ok(ResponsesRequest {
        model: model.to_string(),
        input,
        instructions: (!instructions.is_empty()).then(|| instructions.join("\n")),
        max_output_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools,
        tool_choice,
        parallel_tool_calls,
        user: req.user.clone(),
    })
}

fn translate_tool(tool: &ToolDefinition) -> FunctionTool {
    FunctionTool {
        tool_type: "function".to_string(),
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters: tool.parameters.clone(),
        strict: tool.strict,
    }
}

fn translate_tool_choice(choice: Option<&ToolChoice>) -> ResponsesToolChoice {
    match choice {
        Some(ToolChoice::None) => ResponsesToolChoice::String("none".to_string()),
        Some(ToolChoice::Auto) | None => ResponsesToolChoice::String("auto".to_string()),
        Some(ToolChoice::Required) => ResponsesToolChoice::String("required".to_string()),
        Some(ToolChoice::Specific(name)) => ResponsesToolChoice::Function {
            choice_type: "function".to_string(),
            name: name.clone(),
        },
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

fn convert_usage(usage: ResponsesUsage) -> Usage {
    Usage::from_counts(
        usage.prompt_tokens.unwrap_or(0),
        usage.completion_tokens.unwrap_or(0),
        usage.total_tokens,
    )
}

/// All output items are folded into a single assistant choice.
fn convert_response(resp: ResponsesResponse) -> ChatResponse {
    let mut texts = Vec::new();
    let mut thoughts = Vec::new();
    let mut tool_calls = Vec::new();

    for item in resp.output {
        match item.item_type.as_str() {
            "function_call" => tool_calls.push(ToolCall {
                id: item.call_id.or(item.id).unwrap_or_default(),
                name: item.name.unwrap_or_default(),
                arguments: item.arguments.unwrap_or_else(|| "{}".to_string()),
            }),
            "reasoning" => thoughts.extend(
                item.summary
                    .iter()
                    .flatten()
                    .filter_map(|p| p.text.clone()),
            ),
            _ => {
                if let Some(text) = output_text(&item) {
                    texts.push(text);
                }
            }
        }
    }

    let finish_reason = if !tool_calls.is_empty() {
        "tool_calls"
    } else if resp.status.as_deref() == Some("incomplete") {
        "length"
    } else {
        "stop"
    };

    ChatResponse {
        id: resp.id,
        model: resp.model,
        created: resp.created,
        choices: vec![Choice {
            index: 0,
            message: ResponseMessage {
                role: "assistant".to_string(),
                content: non_empty(Some(texts.join("\n"))),
                reasoning: non_empty(Some(thoughts.join("\n"))),
                tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
            },
            finish_reason: Some(finish_reason.to_string()),
        }],
        usage: resp.usage.map(convert_usage),
    }
}

/// Text carried by a message item, a delta-style entry or an added content part.
fn output_text(item: &OutputItem) -> Option<String> {
    let text = match item.item_type.as_str() {
        "message" => match item.content.as_ref()? {
            OutputContent::Single(part) => part.text.clone(),
            OutputContent::Parts(parts) => Some(
                parts
                    .iter()
                    .filter_map(ContentPart::output_text)
                    .collect::<String>(),
            ),
        },
        "output_text.delta"
        | "response.output_text.delta"
        | "text.delta"
        | "response.text.delta"
        | "response.delta"
        | "response.message.delta" => item.delta.clone(),
        "response.content_part.added" | "content_part.added" => {
            item.part.as_ref()?.output_text().map(String::from)
        }
        _ => None,
    };
    non_empty(text)
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

fn classify(value: &JsonValue) -> Result<Option<StreamChunk>> {
    let has_type = value.get("type").and_then(JsonValue::as_str).is_some();

    match value.decode::<ResponsesStreamChunk>() {
        Ok(chunk) if chunk.is_meaningful() => return Ok(convert_legacy_chunk(chunk)),
        Ok(_) => {}
        Err(e) if !has_type => return Err(BridgeError::invalid_payload(e.to_string())),
        Err(_) => {}
    }

    if !has_type {
        debug!("responses chunk has no outputs and no event type");
        return Ok(None);
    }

    let event: ResponsesEvent = value
        .decode()
        .map_err(|e| BridgeError::invalid_payload(e.to_string()))?;
    convert_event(event)
}

fn convert_legacy_chunk(chunk: ResponsesStreamChunk) -> Option<StreamChunk> {
    let choices = chunk
        .outputs
        .unwrap_or_default()
        .iter()
        .enumerate()
        .filter_map(|(position, item)| {
            let index = item
                .output_index
                .unwrap_or_else(|| u32::try_from(position).unwrap_or(u32::MAX));
            match output_text(item) {
                Some(text) => Some(Delta::content(index, text)),
                None => finished_call(item, index),
            }
        })
        .collect();

    StreamChunk {
        id: chunk.id,
        model: chunk.model,
        created: chunk.created,
        choices,
        usage: chunk.usage.map(convert_usage),
    }
    .compact()
}

/// A completed `function_call` item, surfaced by an `output_item.done` entry.
fn finished_call(entry: &OutputItem, index: u32) -> Option<Delta> {
    if !matches!(
        entry.item_type.as_str(),
        "response.output_item.done" | "output_item.done"
    ) {
        return None;
    }
    function_call_delta(entry.item.as_deref()?, index)
}

fn function_call_delta(item: &OutputItem, index: u32) -> Option<Delta> {
    if item.item_type != "function_call" {
        return None;
    }
    Some(Delta {
        finish_reason: Some("tool_calls".to_string()),
        ..Delta::tool_call(
            index,
            ToolCallFragment {
                index: Some(index),
                id: item.call_id.clone(),
                name: item.name.clone(),
                arguments_chunk: item.arguments.clone(),
            },
        )
    })
}

fn convert_event(event: ResponsesEvent) -> Result<Option<StreamChunk>> {
    let chunk = match event {
        ResponsesEvent::Created { response } => {
            let response = response.unwrap_or_default();
            StreamChunk {
                id: response.id,
                model: response.model,
                created: response.created_at,
                choices: vec![Delta {
                    role: Some("assistant".to_string()),
                    ..Delta::default()
                }],
                usage: None,
            }
        }
        ResponsesEvent::Failed { response } => return Err(failure(response)),
        ResponsesEvent::Error { message, code } => {
            let message = message
                .or_else(|| code.as_ref().and_then(JsonValue::as_str).map(String::from))
                .unwrap_or_else(|| "response stream error".to_string());
            return Err(BridgeError::upstream(message));
        }
        ResponsesEvent::TextDelta {
            delta,
            text_delta,
            output_index,
        } => match non_empty(delta.or(text_delta)) {
            Some(text) => StreamChunk::from_delta(Delta::content(output_index.unwrap_or(0), text)),
            None => return Ok(None),
        },
        ResponsesEvent::ReasoningDelta {
            delta,
            output_index,
        } => match non_empty(delta) {
            Some(text) => {
                StreamChunk::from_delta(Delta::reasoning(output_index.unwrap_or(0), text))
            }
            None => return Ok(None),
        },
        ResponsesEvent::FunctionNameDelta {
            name_delta,
            output_index,
        } => {
            let Some(name) = non_empty(name_delta) else {
                return Ok(None);
            };
            let index = output_index.unwrap_or(0);
            StreamChunk::from_delta(Delta::tool_call(
                index,
                ToolCallFragment {
                    index: Some(index),
                    name: Some(name),
                    ..ToolCallFragment::default()
                },
            ))
        }
        ResponsesEvent::FunctionArgumentsDelta {
            arguments_delta,
            output_index,
        } => {
            let Some(args) = non_empty(arguments_delta) else {
                return Ok(None);
            };
            let index = output_index.unwrap_or(0);
            StreamChunk::from_delta(Delta::tool_call(
                index,
                ToolCallFragment {
                    index: Some(index),
                    arguments_chunk: Some(args),
                    ..ToolCallFragment::default()
                },
            ))
        }
        ResponsesEvent::ContentPartAdded { part, output_index } => {
            let text = part.as_ref().and_then(ContentPart::output_text);
            match non_empty(text.map(String::from)) {
                Some(text) => {
                    StreamChunk::from_delta(Delta::content(output_index.unwrap_or(0), text))
                }
                None => return Ok(None),
            }
        }
        ResponsesEvent::OutputItemDone { item, output_index } => {
            let index = output_index.unwrap_or(0);
            match item.as_ref().and_then(|item| function_call_delta(item, index)) {
                Some(delta) => StreamChunk::from_delta(delta),
                None => return Ok(None),
            }
        }
        ResponsesEvent::Completed | ResponsesEvent::OutputTextDone | ResponsesEvent::Unknown => {
            return Ok(None);
        }
    };
    Ok(chunk.compact())
}

fn failure(response: Option<ResponseEnvelope>) -> BridgeError {
    match response.and_then(|r| r.error).and_then(|e| e.message) {
        Some(message) => BridgeError::upstream(message),
        None => BridgeError::failed_stream("response failed without an error message"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::canonical_types::{ChatMessage, ContentBlock, MessageContent};

    fn event(data: &str) -> Result<Option<StreamChunk>> {
        OpenAiResponses.parse_streaming_chunk(data.as_bytes())
    }

    fn body(req: &ChatRequest) -> serde_json::Value {
        let bytes = OpenAiResponses
            .prepare_request(req, "gpt-5-codex", &JsonObject::new())
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_request_shape() {
        let mut req = ChatRequest::new(vec![
            ChatMessage::system("You are Codex."),
            ChatMessage::user("List files"),
            ChatMessage::assistant("Sure"),
        ]);
        req.max_tokens = Some(512);
        req.stream = Some(true);

        let json = body(&req);
        assert_eq!(json["model"], "gpt-5-codex");
        assert_eq!(json["instructions"], "You are Codex.");
        assert_eq!(json["max_output_tokens"], 512);
        let input = json["input"].as_array().unwrap();
        assert_eq!(input.len(), 2);
        assert_eq!(input[0]["type"], "message");
        assert_eq!(input[0]["role"], "user");
        assert_eq!(input[0]["content"], "List files");
        assert!(json.get("tool_choice").is_none());
        assert!(json.get("parallel_tool_calls").is_none());
    }

    #[test]
    fn test_tools_default_to_auto_and_parallel() {
        let mut req = ChatRequest::new(vec![ChatMessage::user("x")]);
        req.tools = Some(vec![ToolDefinition {
            name: "shell".to_string(),
            description: Some("Run a command".to_string()),
            parameters: Some(JsonValue::from(serde_json::json!({"type": "object"}))),
            strict: Some(true),
        }]);

        let json = body(&req);
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["name"], "shell");
        assert_eq!(json["tools"][0]["strict"], true);
        assert_eq!(json["tool_choice"], "auto");
        assert_eq!(json["parallel_tool_calls"], true);

        req.tool_choice = Some(ToolChoice::Specific("shell".to_string()));
        req.parallel_tool_calls = Some(false);
        let json = body(&req);
        assert_eq!(json["tool_choice"]["type"], "function");
        assert_eq!(json["tool_choice"]["name"], "shell");
        assert_eq!(json["parallel_tool_calls"], false);
    }

    #[test]
    fn test_non_text_content_is_rejected() {
        let req = ChatRequest::new(vec![ChatMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::ImageUrl {
                url: "https://example.com/a.png".to_string(),
                detail: None,
            }]),
        }]);
        assert!(matches!(
            OpenAiResponses.prepare_request(&req, "m", &JsonObject::new()),
            Err(BridgeError::Serialization { .. })
        ));
    }

    #[test]
    fn test_parse_current_response_shape() {
        let data = br#"{
            "id": "resp_1", "object": "response", "created_at": 1741476542, "model": "gpt-4.1",
            "status": "completed",
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": [{"type": "summary_text", "text": "Thought."}]},
                {"type": "message", "id": "msg_1", "role": "assistant",
                 "content": [{"type": "output_text", "text": "Hello", "annotations": []}]},
                {"type": "function_call", "id": "fc_1", "call_id": "call_1",
                 "name": "shell", "arguments": "{\"cmd\":\"ls\"}"}
            ],
            "usage": {"input_tokens": 36, "output_tokens": 87, "total_tokens": 123}
        }"#;
        let resp = OpenAiResponses.parse_response(data).unwrap();
        assert_eq!(resp.text(), Some("Hello"));
        assert_eq!(resp.created, Some(1_741_476_542));
        let choice = &resp.choices[0];
        assert_eq!(choice.message.reasoning.as_deref(), Some("Thought."));
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        let call = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.arguments, "{\"cmd\":\"ls\"}");
        let usage = resp.usage.unwrap();
        assert_eq!((usage.prompt_tokens, usage.completion_tokens, usage.total_tokens), (36, 87, 123));
    }

    #[test]
    fn test_parse_legacy_response_shape() {
        let data = br#"{
            "id": "resp_2", "object": "response", "created": 1, "model": "m",
            "outputs": [{"type": "message", "content": {"text": "Legacy hello"}}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 3}
        }"#;
        let resp = OpenAiResponses.parse_response(data).unwrap();
        assert_eq!(resp.text(), Some("Legacy hello"));
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn test_parse_response_requires_output() {
        assert!(matches!(
            OpenAiResponses.parse_response(br#"{"id":"x"}"#),
            Err(BridgeError::Decode { .. })
        ));
    }

    #[test]
    fn test_text_delta_aliases() {
        for kind in [
            "response.output_text.delta",
            "response.text.delta",
            "response.delta",
            "response.message.delta",
            "text.delta",
            "output_text.delta",
        ] {
            let raw = format!(r#"{{"type":"{kind}","delta":"Hi","output_index":0}}"#);
            let chunk = event(&raw).unwrap().unwrap();
            assert_eq!(chunk.content(), "Hi", "{kind}");
            assert!(chunk.choices[0].role.is_none(), "{kind}");
        }

        let chunk = event(r#"{"type":"response.output_text.delta","text_delta":"alt"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.content(), "alt");
    }

    #[test]
    fn test_created_event_carries_role() {
        let chunk = event(
            r#"{"type":"response.created","response":{"id":"resp_9","model":"gpt-5","status":"in_progress"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.choices[0].role.as_deref(), Some("assistant"));
        assert_eq!(chunk.id.as_deref(), Some("resp_9"));
    }

    #[test]
    fn test_function_call_events() {
        let name = event(r#"{"type":"response.function_call.name.delta","name_delta":"ec","output_index":1}"#)
            .unwrap()
            .unwrap();
        let frag = &name.choices[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!((frag.index, frag.name.as_deref()), (Some(1), Some("ec")));

        let args = event(r#"{"type":"function_call.arguments.delta","arguments_delta":"{}"}"#)
            .unwrap()
            .unwrap();
        let frag = &args.choices[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!((frag.index, frag.arguments_chunk.as_deref()), (Some(0), Some("{}")));
    }

    #[test]
    fn test_output_item_done_with_function_call() {
        let chunk = event(
            r#"{"type":"response.output_item.done","output_index":2,
                "item":{"type":"function_call","call_id":"call_7","name":"shell","arguments":"{\"cmd\":\"pwd\"}"}}"#,
        )
        .unwrap()
        .unwrap();
        let delta = &chunk.choices[0];
        assert_eq!(delta.finish_reason.as_deref(), Some("tool_calls"));
        let frag = &delta.tool_calls.as_ref().unwrap()[0];
        assert_eq!(frag.index, Some(2));
        assert_eq!(frag.id.as_deref(), Some("call_7"));
        assert_eq!(frag.name.as_deref(), Some("shell"));
        assert_eq!(frag.arguments_chunk.as_deref(), Some("{\"cmd\":\"pwd\"}"));

        let plain = event(
            r#"{"type":"response.output_item.done","item":{"type":"message","content":[]}}"#,
        )
        .unwrap();
        assert!(plain.is_none());
    }

    #[test]
    fn test_content_part_added() {
        let chunk = event(
            r#"{"type":"response.content_part.added","part":{"type":"output_text","text":"Hey"}}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.content(), "Hey");

        let empty = event(
            r#"{"type":"response.content_part.added","part":{"type":"output_text","text":""}}"#,
        )
        .unwrap();
        assert!(empty.is_none());
    }

    #[test]
    fn test_reasoning_summary_delta() {
        let chunk = event(r#"{"type":"response.reasoning_summary_text.delta","delta":"why"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.reasoning(), "why");
    }

    #[test]
    fn test_failed_event_surfaces_message() {
        let err = event(r#"{"type":"response.failed","response":{"error":{"message":"boom"}}}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Upstream { .. }));
        assert_eq!(err.to_string(), "boom");

        let err = event(r#"{"type":"response.failed","response":{}}"#).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidStreamingPayload { terminal: true, .. }));
        assert!(err.is_terminal());
    }

    #[test]
    fn test_error_event() {
        let err = event(r#"{"type":"error","code":"rate_limit_exceeded","message":"slow down"}"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "slow down");
    }

    #[test]
    fn test_no_content_events() {
        for raw in [
            r#"{"type":"response.completed","response":{"id":"r","usage":{"input_tokens":1}}}"#,
            r#"{"type":"response.output_text.done","text":"full text"}"#,
            r#"{"type":"response.in_progress","response":{}}"#,
            r#"{"type":"response.brand_new_event"}"#,
            r#"{"type":"response.output_text.delta","delta":""}"#,
            "[DONE]",
            "data: [done]",
        ] {
            assert!(event(raw).unwrap().is_none(), "expected no content for {raw}");
        }
    }

    #[test]
    fn test_legacy_chunk() {
        let chunk = event(
            r#"{"id":"resp_1","model":"m","outputs":[
                {"type":"response.output_text.delta","delta":"A"},
                {"type":"message","content":{"text":"B"},"output_index":3},
                {"type":"response.output_item.done","item":{"type":"function_call","call_id":"c","name":"f","arguments":"{}"}}
            ]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.choices.len(), 3);
        assert_eq!(chunk.choices[0].content.as_deref(), Some("A"));
        assert!(chunk.choices[0].role.is_none());
        assert_eq!(chunk.choices[1].index, 3);
        assert_eq!(chunk.choices[2].finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(chunk.choices[2].index, 2);
    }

    #[test]
    fn test_empty_legacy_shape_is_no_content() {
        assert!(event(r#"{"outputs":[]}"#).unwrap().is_none());
        assert!(event(r#"{"object":"response.chunk"}"#).unwrap().is_none());
    }

    #[test]
    fn test_sse_framed_event() {
        let raw = "event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"framed\"}\n\n";
        assert_eq!(event(raw).unwrap().unwrap().content(), "framed");
    }

    #[test]
    fn test_malformed_payloads() {
        assert!(matches!(
            event("garbage"),
            Err(BridgeError::InvalidStreamingPayload { .. })
        ));
        assert!(matches!(
            event(r#"{"type":"response.output_text.delta","delta":42}"#),
            Err(BridgeError::InvalidStreamingPayload { .. })
        ));
        assert!(matches!(
            event("[1,2,3]"),
            Err(BridgeError::InvalidStreamingPayload { .. })
        ));
    }
}
