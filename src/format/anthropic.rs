//! Anthropic Messages adapter (`/v1/messages`).
//!
//! System messages move to the top-level `system` field, `max_tokens` is mandatory
//! (4096 when unset) and only text content is accepted. Streamed events are
//! dispatched on their `type` discriminator; the content-block index becomes both the
//! delta index and the tool-call fragment index.

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::json::{JsonObject, JsonValue};

use super::anthropic_types::{
    BlockDelta, Message, MessagesRequest, MessagesResponse, Metadata, ResponseContentBlock,
    Role as WireRole, StartBlock, StreamEvent, StreamMessage, Tool, ToolChoice as WireToolChoice,
    Usage as WireUsage,
};
use super::canonical_types::{
    ChatRequest, ChatResponse, Choice, Delta, ResponseMessage, Role, StreamChunk, ToolCall,
    ToolCallFragment, ToolChoice, ToolDefinition, Usage,
};
use super::{finish_body, non_empty, ChatFormat};
use crate::stream::sse::{decode_json_frame, Frame};

pub const DEFAULT_MAX_TOKENS: u64 = 4096;
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicMessages;

impl ChatFormat for AnthropicMessages {
    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        extra: &JsonObject,
    ) -> Result<Vec<u8>> {
        finish_body(&build_request(request, model)?, extra)
    }

    fn parse_response(&self, data: &[u8]) -> Result<ChatResponse> {
        let resp: MessagesResponse =
            serde_json::from_slice(data).map_err(|e| BridgeError::decode(e.to_string()))?;
        Ok(convert_response(resp))
    }

    fn parse_streaming_chunk(&self, data: &[u8]) -> Result<Option<StreamChunk>> {
        match decode_json_frame::<StreamEvent>(data)? {
            Frame::Event(event) => convert_event(event),
            Frame::Done | Frame::Empty => Ok(None),
        }
    }

    fn endpoint_path(&self) -> &'static str {
        "/v1/messages"
    }

    fn format_name(&self) -> &'static str {
        "anthropic_messages"
    }

    fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        vec![("anthropic-version", ANTHROPIC_VERSION)]
    }
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Build the Messages body, or fail if any message carries non-text content.
pub fn build_request(req: &ChatRequest, model: &str) -> Result<MessagesRequest> {
    let mut system = Vec::new();
    let mut messages = Vec::with_capacity(req.messages.len());

    for msg in &req.messages {
        let text = msg.content.text_only().ok_or_else(|| {
            BridgeError::serialization(format!(
                "{} message has non-text content, which the Anthropic Messages format does not support",
                msg.role.as_str()
            ))
        })?;
        let role = match msg.role {
            Role::System => {
                system.push(text);
                continue;
            }
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
        };
        messages.push(Message {
            role,
            content: text,
        });
    }

    let tools: Option<Vec<Tool>> = req
        .tools
        .as_ref()
        .map(|tools| tools.iter().map(translate_tool).collect());
    let tool_choice = translate_tool_choice(
        req.tool_choice.as_ref(),
        req.parallel_tool_calls,
        tools.is_some(),
    );

    Ok(MessagesRequest {
        model: model.to_string(),
        max_tokens: req.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages,
        system: (!system.is_empty()).then(|| system.join("\n")),
        stream: req.stream,
        temperature: req.temperature,
        top_p: req.top_p,
        tools,
        tool_choice,
        metadata: req.user.clone().map(|user_id| Metadata {
            user_id: Some(user_id),
        }),
        stop_sequences: req.stop.clone(),
    })
}

fn translate_tool(tool: &ToolDefinition) -> Tool {
    let input_schema = tool.parameters.clone().unwrap_or_else(|| {
        JsonValue::from(serde_json::json!({"type": "object", "properties": {}}))
    });
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema,
    }
}

fn translate_tool_choice(
    choice: Option<&ToolChoice>,
    parallel: Option<bool>,
    has_tools: bool,
) -> Option<WireToolChoice> {
    let disable_parallel_tool_use = parallel.map(|p| !p);
    match choice {
        Some(ToolChoice::None) => Some(WireToolChoice::None),
        Some(ToolChoice::Auto) => Some(WireToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        Some(ToolChoice::Required) => Some(WireToolChoice::Any {
            disable_parallel_tool_use,
        }),
        Some(ToolChoice::Specific(name)) => Some(WireToolChoice::Tool {
            name: name.clone(),
            disable_parallel_tool_use,
        }),
        // Parallelism can only be expressed through a tool_choice object.
        None if has_tools && parallel == Some(false) => Some(WireToolChoice::Auto {
            disable_parallel_tool_use,
        }),
        None => None,
    }
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Map an Anthropic `stop_reason` onto the canonical finish-reason vocabulary.
pub fn map_stop_reason(reason: &str) -> String {
    match reason {
        "end_turn" | "stop_sequence" => "stop".to_string(),
        "max_tokens" => "length".to_string(),
        "tool_use" => "tool_calls".to_string(),
        "refusal" => "content_filter".to_string(),
        other => other.to_string(),
    }
}

fn convert_usage(usage: WireUsage) -> Usage {
    Usage::from_counts(usage.input_tokens, usage.output_tokens, None)
}

fn convert_response(resp: MessagesResponse) -> ChatResponse {
    let mut texts = Vec::new();
    let mut thoughts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            ResponseContentBlock::Text { text } => texts.push(text),
            ResponseContentBlock::Thinking { thinking, .. } => thoughts.push(thinking),
            ResponseContentBlock::ToolUse { id, name, input } => {
                let arguments = input
                    .and_then(|v| v.to_vec().ok())
                    .and_then(|bytes| String::from_utf8(bytes).ok())
                    .unwrap_or_else(|| "{}".to_string());
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments,
                });
            }
            ResponseContentBlock::Other => {}
        }
    }

    let message = ResponseMessage {
        role: resp.role,
        content: non_empty(Some(texts.join("\n"))),
        reasoning: non_empty(Some(thoughts.join("\n"))),
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
    };

    ChatResponse {
        id: Some(resp.id),
        model: resp.model,
        created: None,
        choices: vec![Choice {
            index: 0,
            message,
            finish_reason: resp.stop_reason.as_deref().map(map_stop_reason),
        }],
        usage: resp.usage.map(convert_usage),
    }
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

fn convert_event(event: StreamEvent) -> Result<Option<StreamChunk>> {
    let chunk = match event {
        StreamEvent::MessageStart { message } => message_start(message),
        StreamEvent::ContentBlockStart {
            index,
            content_block,
        } => StreamChunk::from_delta(block_start(index.unwrap_or(0), content_block)),
        StreamEvent::ContentBlockDelta { index, delta } => {
            StreamChunk::from_delta(block_delta(index.unwrap_or(0), delta))
        }
        StreamEvent::MessageDelta { delta, usage } => StreamChunk {
            choices: vec![Delta {
                finish_reason: delta.stop_reason.as_deref().map(map_stop_reason),
                ..Delta::default()
            }],
            usage: usage.map(|u| {
                Usage::from_counts(u.input_tokens.unwrap_or(0), u.output_tokens, None)
            }),
            ..StreamChunk::default()
        },
        StreamEvent::Error { error } => {
            let message = error
                .message
                .or(error.error_type)
                .unwrap_or_else(|| "Anthropic stream error".to_string());
            return Err(BridgeError::upstream(message));
        }
        other @ (StreamEvent::ContentBlockStop { .. }
        | StreamEvent::MessageStop
        | StreamEvent::Ping
        | StreamEvent::Unknown) => {
            debug!(event = other.event_name(), "anthropic event carries no content");
            return Ok(None);
        }
    };
    Ok(chunk.compact())
}

fn message_start(message: StreamMessage) -> StreamChunk {
    StreamChunk {
        id: message.id,
        model: message.model,
        created: None,
        choices: vec![Delta {
            role: Some(message.role.unwrap_or_else(|| "assistant".to_string())),
            ..Delta::default()
        }],
        usage: message.usage.map(convert_usage),
    }
}

fn block_start(index: u32, block: StartBlock) -> Delta {
    match block.block_type.as_deref() {
        Some("tool_use" | "server_tool_use") => Delta::tool_call(
            index,
            ToolCallFragment {
                index: Some(index),
                id: block.id,
                name: block.name,
                arguments_chunk: None,
            },
        ),
        Some("thinking") => Delta {
            index,
            reasoning: non_empty(block.thinking),
            ..Delta::default()
        },
        _ => Delta {
            index,
            content: non_empty(block.text),
            ..Delta::default()
        },
    }
}

fn block_delta(index: u32, delta: BlockDelta) -> Delta {
    let finish_reason = delta.stop_reason.as_deref().map(map_stop_reason);
    let mut out = match delta.delta_type.as_deref() {
        Some("input_json_delta") => Delta::tool_call(
            index,
            ToolCallFragment {
                index: Some(index),
                arguments_chunk: delta.partial_json,
                ..ToolCallFragment::default()
            },
        ),
        Some("thinking_delta") => Delta {
            index,
            reasoning: non_empty(delta.thinking),
            ..Delta::default()
        },
        Some("signature_delta" | "citations_delta") => Delta {
            index,
            ..Delta::default()
        },
        // "text_delta", or no type at all.
        _ => Delta {
            index,
            content: non_empty(delta.text),
            ..Delta::default()
        },
    };
    out.finish_reason = finish_reason;
    out
}
