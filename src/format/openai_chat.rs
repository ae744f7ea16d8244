//! OpenAI Chat Completions adapter (`/v1/chat/completions`).
//!
//! The canonical model already uses this API's vocabulary, so the mapping is mostly
//! one-to-one. System messages stay inline in `messages`.

use crate::error::{BridgeError, Result};
use crate::json::JsonObject;

use super::canonical_types::{
    ChatMessage as CanonicalMessage, ChatRequest, ChatResponse, Choice as CanonicalChoice,
    ContentBlock, Delta, MessageContent, ResponseMessage, StreamChunk, ToolCall, ToolCallFragment,
    ToolChoice, ToolDefinition, Usage,
};
use super::openai_types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatContent, ChatFunction,
    ChatMessage, ChatTool, ChatToolChoice, ChatToolChoiceFunction, ChatToolChoiceSpecific,
    ChatUsage, ChunkChoice, ContentPart, ImageUrlDetail, StreamOptions,
};
use super::{finish_body, non_empty, ChatFormat};
use crate::stream::sse::{decode_json_frame, Frame};

#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAiChatCompletion;

impl ChatFormat for OpenAiChatCompletion {
    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        extra: &JsonObject,
    ) -> Result<Vec<u8>> {
        finish_body(&build_request(request, model), extra)
    }

    fn parse_response(&self, data: &[u8]) -> Result<ChatResponse> {
        let resp: ChatCompletionResponse =
            serde_json::from_slice(data).map_err(|e| BridgeError::decode(e.to_string()))?;
        Ok(convert_response(resp))
    }

    fn parse_streaming_chunk(&self, data: &[u8]) -> Result<Option<StreamChunk>> {
        match decode_json_frame::<ChatCompletionChunk>(data)? {
            Frame::Event(chunk) => Ok(convert_chunk(chunk)),
            Frame::Done | Frame::Empty => Ok(None),
        }
    }

    fn endpoint_path(&self) -> &'static str {
        "/v1/chat/completions"
    }

    fn format_name(&self) -> &'static str {
        "openai_chat_completion"
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Build the Chat Completions body. Every canonical content block is representable.
pub fn build_request(req: &ChatRequest, model: &str) -> ChatCompletionRequest {
    let stream_options = req.stream.filter(|s| *s).map(|_| StreamOptions {
        include_usage: true,
    });

    ChatCompletionRequest {
        model: model.to_string(),
        messages: req.messages.iter().map(translate_message).collect(),
        max_tokens: req.max_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        stream_options,
        tools: req
            .tools
            .as_ref()
            .map(|tools| tools.iter().map(translate_tool).collect()),
        tool_choice: req.tool_choice.as_ref().map(translate_tool_choice),
        parallel_tool_calls: req.parallel_tool_calls,
        stop: req.stop.clone(),
        user: req.user.clone(),
    }
}

fn translate_message(msg: &CanonicalMessage) -> ChatMessage {
    let content = match &msg.content {
        MessageContent::Text(text) => ChatContent::Text(text.clone()),
        MessageContent::Blocks(blocks) => {
            let parts: Vec<ContentPart> = blocks
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => ContentPart::Text { text: text.clone() },
                    ContentBlock::ImageUrl { url, detail } => ContentPart::ImageUrl {
                        image_url: ImageUrlDetail {
                            url: url.clone(),
                            detail: detail.clone(),
                        },
                    },
                })
                .collect();
            collapse_content_parts(parts)
        }
    };

    ChatMessage {
        role: msg.role.as_str().to_string(),
        content,
    }
}

fn collapse_content_parts(parts: Vec<ContentPart>) -> ChatContent {
    if let [ContentPart::Text { text }] = parts.as_slice() {
        return ChatContent::Text(text.clone());
    }
    ChatContent::Parts(parts)
}

fn translate_tool(tool: &ToolDefinition) -> ChatTool {
    ChatTool {
        tool_type: "function".to_string(),
        function: ChatFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: tool.parameters.clone(),
            strict: tool.strict,
        },
    }
}

fn translate_tool_choice(choice: &ToolChoice) -> ChatToolChoice {
    match choice {
        ToolChoice::None => ChatToolChoice::String("none".to_string()),
        ToolChoice::Auto => ChatToolChoice::String("auto".to_string()),
        ToolChoice::Required => ChatToolChoice::String("required".to_string()),
        ToolChoice::Specific(name) => ChatToolChoice::Specific(ChatToolChoiceSpecific {
            choice_type: "function".to_string(),
            function: ChatToolChoiceFunction { name: name.clone() },
        }),
    }
}

// ---------------------------------------------------------------------------
// Responses and streaming
// ---------------------------------------------------------------------------

fn convert_usage(usage: ChatUsage) -> Usage {
    Usage::from_counts(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
}

fn convert_response(resp: ChatCompletionResponse) -> ChatResponse {
    let choices = resp
        .choices
        .into_iter()
        .map(|choice| {
            let message = choice.message;
            let tool_calls = message.tool_calls.map(|calls| {
                calls
                    .into_iter()
                    .map(|call| ToolCall {
                        id: call.id,
                        name: call.function.name,
                        arguments: call.function.arguments,
                    })
                    .collect()
            });
            CanonicalChoice {
                index: choice.index,
                message: ResponseMessage {
                    role: message.role,
                    content: message.content,
                    reasoning: non_empty(message.reasoning_content.or(message.reasoning)),
                    tool_calls,
                },
                finish_reason: choice.finish_reason,
            }
        })
        .collect();

    ChatResponse {
        id: resp.id,
        model: resp.model,
        created: resp.created,
        choices,
        usage: resp.usage.map(convert_usage),
    }
}

fn convert_chunk(chunk: ChatCompletionChunk) -> Option<StreamChunk> {
    StreamChunk {
        id: chunk.id,
        model: chunk.model,
        created: chunk.created,
        choices: chunk.choices.into_iter().map(convert_choice).collect(),
        usage: chunk.usage.map(convert_usage),
    }
    .compact()
}

fn convert_choice(choice: ChunkChoice) -> Delta {
    let delta = choice.delta;
    let tool_calls: Vec<ToolCallFragment> = delta
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| {
            let (name, arguments_chunk) = call
                .function
                .map_or((None, None), |f| (f.name, f.arguments));
            ToolCallFragment {
                index: call.index,
                id: call.id,
                name,
                arguments_chunk,
            }
        })
        .collect();

    Delta {
        index: choice.index,
        role: non_empty(delta.role),
        content: non_empty(delta.content),
        reasoning: non_empty(delta.reasoning_content.or(delta.reasoning)),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        finish_reason: choice.finish_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::canonical_types::Role;
    use crate::json::JsonValue;

    fn chunk(data: &str) -> Option<StreamChunk> {
        OpenAiChatCompletion
            .parse_streaming_chunk(data.as_bytes())
            .unwrap()
    }

    fn body(req: &ChatRequest) -> serde_json::Value {
        let bytes = OpenAiChatCompletion
            .prepare_request(req, "gpt-4o", &JsonObject::new())
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_simple_request_keeps_system_inline() {
        let mut req = ChatRequest::new(vec![
            CanonicalMessage::system("You are helpful"),
            CanonicalMessage::user("Hello"),
        ]);
        req.max_tokens = Some(256);
        req.stream = Some(true);

        let json = body(&req);
        assert_eq!(json["model"], "gpt-4o");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "You are helpful");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["stream_options"]["include_usage"], true);
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn test_image_blocks_become_parts() {
        let req = ChatRequest::new(vec![CanonicalMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![
                ContentBlock::Text {
                    text: "What is this?".to_string(),
                },
                ContentBlock::ImageUrl {
                    url: "data:image/png;base64,AAAA".to_string(),
                    detail: Some("low".to_string()),
                },
            ]),
        }]);
        let json = body(&req);
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["detail"], "low");
    }

    #[test]
    fn test_single_text_block_collapses_to_string() {
        let req = ChatRequest::new(vec![CanonicalMessage {
            role: Role::User,
            content: MessageContent::Blocks(vec![ContentBlock::Text {
                text: "hi".to_string(),
            }]),
        }]);
        assert_eq!(body(&req)["messages"][0]["content"], "hi");
    }

    #[test]
    fn test_tools_and_tool_choice() {
        let mut req = ChatRequest::new(vec![CanonicalMessage::user("weather?")]);
        req.tools = Some(vec![ToolDefinition {
            name: "get_weather".to_string(),
            description: Some("Look up weather".to_string()),
            parameters: Some(JsonValue::from(serde_json::json!({
                "type": "object",
                "properties": {"city": {"type": "string"}}
            }))),
            strict: None,
        }]);
        req.tool_choice = Some(ToolChoice::Specific("get_weather".to_string()));

        let json = body(&req);
        assert_eq!(json["tools"][0]["type"], "function");
        assert_eq!(json["tools"][0]["function"]["name"], "get_weather");
        assert_eq!(
            json["tools"][0]["function"]["parameters"]["properties"]["city"]["type"],
            "string"
        );
        assert_eq!(json["tool_choice"]["type"], "function");
        assert_eq!(json["tool_choice"]["function"]["name"], "get_weather");

        for (choice, wire) in [
            (ToolChoice::None, "none"),
            (ToolChoice::Auto, "auto"),
            (ToolChoice::Required, "required"),
        ] {
            req.tool_choice = Some(choice);
            assert_eq!(body(&req)["tool_choice"], wire);
        }
    }

    #[test]
    fn test_extra_fields_override_generated() {
        let req = ChatRequest::new(vec![CanonicalMessage::user("x")]);
        let mut extra = JsonObject::new();
        extra.insert("model".to_string(), JsonValue::from("override"));
        extra.insert("seed".to_string(), JsonValue::from(42_i64));
        let bytes = OpenAiChatCompletion
            .prepare_request(&req, "gpt-4o", &extra)
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["model"], "override");
        assert_eq!(json["seed"], 42);
    }

    #[test]
    fn test_parse_response_with_tool_calls_and_reasoning() {
        let data = br#"{
            "id": "chatcmpl-1", "object": "chat.completion", "created": 1700000000,
            "model": "deepseek-reasoner",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Checking.",
                    "reasoning_content": "need weather",
                    "tool_calls": [{"id": "call_1", "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5}
        }"#;
        let resp = OpenAiChatCompletion.parse_response(data).unwrap();
        assert_eq!(resp.text(), Some("Checking."));
        let choice = &resp.choices[0];
        assert_eq!(choice.message.reasoning.as_deref(), Some("need weather"));
        assert_eq!(choice.finish_reason.as_deref(), Some("tool_calls"));
        let call = &choice.message.tool_calls.as_ref().unwrap()[0];
        assert_eq!(call.name, "get_weather");
        assert_eq!(call.arguments, "{\"city\":\"Oslo\"}");
        assert_eq!(resp.usage.unwrap().total_tokens, 15);
    }

    #[test]
    fn test_parse_response_rejects_wrong_schema() {
        let err = OpenAiChatCompletion
            .parse_response(br#"{"type":"message","content":[]}"#)
            .unwrap_err();
        assert!(matches!(err, BridgeError::Decode { .. }));
    }

    #[test]
    fn test_role_and_text_deltas() {
        let first = chunk(
            r#"{"id":"c1","object":"chat.completion.chunk","created":1,"model":"m",
                "choices":[{"index":0,"delta":{"role":"assistant","content":""},"finish_reason":null}]}"#,
        )
        .unwrap();
        assert_eq!(first.choices[0].role.as_deref(), Some("assistant"));
        assert!(first.choices[0].content.is_none());

        let second = chunk(r#"{"choices":[{"index":0,"delta":{"content":"Hel"}}]}"#).unwrap();
        assert_eq!(second.content(), "Hel");
        assert!(second.choices[0].role.is_none());
    }

    #[test]
    fn test_sse_framed_chunk() {
        let c = chunk("data: {\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\n\n").unwrap();
        assert_eq!(c.content(), "x");
        assert_eq!(c.choices[0].index, 0);
    }

    #[test]
    fn test_tool_call_fragments() {
        let c = chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"id":"call_9","type":"function","function":{"name":"echo","arguments":""}}
            ]}}]}"#,
        )
        .unwrap();
        let frag = &c.choices[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(frag.index, Some(0));
        assert_eq!(frag.id.as_deref(), Some("call_9"));
        assert_eq!(frag.name.as_deref(), Some("echo"));

        let c = chunk(
            r#"{"choices":[{"index":0,"delta":{"tool_calls":[
                {"index":0,"function":{"arguments":"{\"x\":1}"}}
            ]}}]}"#,
        )
        .unwrap();
        let frag = &c.choices[0].tool_calls.as_ref().unwrap()[0];
        assert_eq!(frag.arguments_chunk.as_deref(), Some("{\"x\":1}"));
        assert!(frag.name.is_none());
    }

    #[test]
    fn test_reasoning_fields() {
        let c = chunk(r#"{"choices":[{"delta":{"reasoning_content":"hmm"}}]}"#).unwrap();
        assert_eq!(c.reasoning(), "hmm");
        let c = chunk(r#"{"choices":[{"delta":{"reasoning":"also"}}]}"#).unwrap();
        assert_eq!(c.reasoning(), "also");
    }

    #[test]
    fn test_finish_and_usage_chunks() {
        let c = chunk(r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#).unwrap();
        assert_eq!(c.choices[0].finish_reason.as_deref(), Some("stop"));

        let c = chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":4,"total_tokens":9}}"#,
        )
        .unwrap();
        assert_eq!(c.usage.unwrap().total_tokens, 9);
        assert!(c.choices.is_empty());
    }

    #[test]
    fn test_huge_usage_counts_do_not_panic() {
        let c = chunk(
            r#"{"choices":[],"usage":{"prompt_tokens":18446744073709551615,"completion_tokens":1,"total_tokens":5}}"#,
        )
        .unwrap();
        assert_eq!(c.usage.unwrap().total_tokens, 5);
    }

    #[test]
    fn test_keep_alive_and_sentinel_are_no_content() {
        assert!(chunk(r#"{"choices":[{"index":0,"delta":{}}]}"#).is_none());
        assert!(chunk("[DONE]").is_none());
        assert!(chunk("  [done]  ").is_none());
        assert!(chunk("data: [DONE]").is_none());
        assert!(chunk("").is_none());
    }

    #[test]
    fn test_malformed_chunk_is_invalid_payload() {
        let err = OpenAiChatCompletion
            .parse_streaming_chunk(b"not json")
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidStreamingPayload { .. }));
    }
}
