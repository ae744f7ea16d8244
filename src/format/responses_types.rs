//! Wire types for the [OpenAI Responses API](https://platform.openai.com/docs/api-reference/responses)
//! and the ChatGPT Codex backend that speaks it.
//!
//! Streaming arrives in two shapes: the legacy chunk (`{"id", "model", "outputs": [...]}`)
//! and typed event envelopes (`{"type": "response.output_text.delta", ...}`).

use serde::{Deserialize, Serialize};

use crate::json::JsonValue;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<InputItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<FunctionTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ResponsesToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// A conversation turn. Role sits at the top level and content is plain text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputItem {
    #[serde(rename = "type")]
    pub item_type: String, // "message"
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionTool {
    #[serde(rename = "type")]
    pub tool_type: String, // "function"
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsesToolChoice {
    String(String), // "auto", "required", "none"
    Function {
        #[serde(rename = "type")]
        choice_type: String, // "function"
        name: String,
    },
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponsesResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created: Option<i64>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(alias = "outputs")]
    pub output: Vec<OutputItem>,
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
}

/// One output entry. Loose on purpose: the same shape covers message items,
/// function calls, reasoning items and the legacy delta-style entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(rename = "type", default)]
    pub item_type: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<OutputContent>,
    #[serde(default)]
    pub delta: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub part: Option<ContentPart>,
    #[serde(default)]
    pub item: Option<Box<OutputItem>>,
    #[serde(default)]
    pub output_index: Option<u32>,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
    #[serde(default)]
    pub summary: Option<Vec<ContentPart>>,
}

/// `content` is an array of parts today; legacy servers sent a single `{ "text": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutputContent {
    Parts(Vec<ContentPart>),
    Single(ContentPart),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type", default)]
    pub part_type: Option<String>, // "output_text", "text", "summary_text", "refusal"
    #[serde(default)]
    pub text: Option<String>,
}

impl ContentPart {
    /// Text of an `output_text`/`text` part (or an untyped legacy part).
    pub fn output_text(&self) -> Option<&str> {
        match self.part_type.as_deref() {
            None | Some("output_text" | "text" | "summary_text") => self.text.as_deref(),
            Some(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ResponsesUsage {
    #[serde(default, alias = "input_tokens")]
    pub prompt_tokens: Option<u64>,
    #[serde(default, alias = "output_tokens")]
    pub completion_tokens: Option<u64>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
}

// ---------------------------------------------------------------------------
// Streaming types
// ---------------------------------------------------------------------------

/// The legacy streaming chunk. Any JSON object decodes into it, so callers must
/// check [`ResponsesStreamChunk::is_meaningful`] before trusting it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponsesStreamChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<ResponsesUsage>,
    #[serde(default)]
    pub outputs: Option<Vec<OutputItem>>,
}

impl ResponsesStreamChunk {
    pub fn is_meaningful(&self) -> bool {
        self.outputs.as_ref().is_some_and(|o| !o.is_empty())
            || self.usage.is_some()
            || self.id.is_some()
            || self.model.is_some()
    }
}

/// Typed event envelopes, keyed on `type`. Unknown types decode to [`ResponsesEvent::Unknown`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ResponsesEvent {
    #[serde(rename = "response.created")]
    Created {
        #[serde(default)]
        response: Option<ResponseEnvelope>,
    },
    #[serde(rename = "response.completed")]
    Completed,
    #[serde(rename = "response.failed")]
    Failed {
        #[serde(default)]
        response: Option<ResponseEnvelope>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        code: Option<JsonValue>,
    },
    #[serde(
        rename = "response.output_text.delta",
        alias = "response.text.delta",
        alias = "response.delta",
        alias = "response.message.delta",
        alias = "text.delta",
        alias = "output_text.delta"
    )]
    TextDelta {
        #[serde(default)]
        delta: Option<String>,
        #[serde(default)]
        text_delta: Option<String>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(
        rename = "response.reasoning_summary_text.delta",
        alias = "response.reasoning_text.delta"
    )]
    ReasoningDelta {
        #[serde(default)]
        delta: Option<String>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(
        rename = "response.function_call.name.delta",
        alias = "function_call.name.delta"
    )]
    FunctionNameDelta {
        #[serde(default)]
        name_delta: Option<String>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(
        rename = "response.function_call.arguments.delta",
        alias = "function_call.arguments.delta"
    )]
    FunctionArgumentsDelta {
        #[serde(default)]
        arguments_delta: Option<String>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(rename = "response.content_part.added", alias = "content_part.added")]
    ContentPartAdded {
        #[serde(default)]
        part: Option<ContentPart>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(rename = "response.output_item.done", alias = "output_item.done")]
    OutputItemDone {
        #[serde(default)]
        item: Option<OutputItem>,
        #[serde(default)]
        output_index: Option<u32>,
    },
    #[serde(rename = "response.output_text.done", alias = "output_text.done")]
    OutputTextDone,
    #[serde(other)]
    Unknown,
}

/// The `response` object nested in lifecycle events.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default)]
    pub code: Option<JsonValue>,
    #[serde(default)]
    pub message: Option<String>,
}
