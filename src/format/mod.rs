//! Translation between the canonical chat shapes and each provider's wire format.
//!
//! Every provider is a stateless [`ChatFormat`] adapter. Streaming state (reasoning
//! splitting, tool-call reassembly) lives in [`crate::stream`], never here, so one
//! adapter instance can serve any number of concurrent streams.

pub mod anthropic;
pub mod anthropic_types;
pub mod canonical_types;
pub mod openai_chat;
pub mod openai_types;
pub mod responses;
pub mod responses_types;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, ErrorInfo, Result};
use crate::json::{JsonObject, JsonValue};

use self::canonical_types::{ChatRequest, ChatResponse, StreamChunk};

pub use self::anthropic::AnthropicMessages;
pub use self::openai_chat::OpenAiChatCompletion;
pub use self::responses::OpenAiResponses;

/// A provider wire format.
pub trait ChatFormat: Send + Sync + fmt::Debug {
    /// Build the JSON request body. `extra` is merged last and overrides generated keys.
    fn prepare_request(
        &self,
        request: &ChatRequest,
        model: &str,
        extra: &JsonObject,
    ) -> Result<Vec<u8>>;

    /// Decode a complete, non-streamed response body.
    fn parse_response(&self, data: &[u8]) -> Result<ChatResponse>;

    /// Decode one streamed event. `Ok(None)` means the event carries nothing
    /// observable: a keep-alive, the `[DONE]` sentinel, or an unknown event type.
    fn parse_streaming_chunk(&self, data: &[u8]) -> Result<Option<StreamChunk>>;

    /// Best-effort extraction of an error from a failed response body.
    fn parse_error(&self, data: &[u8]) -> Option<ErrorInfo> {
        parse_error_body(data)
    }

    /// Path appended to the provider base URL, e.g. `/v1/chat/completions`.
    fn endpoint_path(&self) -> &'static str;

    fn format_name(&self) -> &'static str;

    fn supports_streaming(&self) -> bool {
        true
    }

    /// Headers this format always needs, in addition to auth and content type.
    fn default_headers(&self) -> Vec<(&'static str, &'static str)> {
        Vec::new()
    }
}

/// Which adapter to use for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormatKind {
    #[serde(
        rename = "openai_chat",
        alias = "openai",
        alias = "chat",
        alias = "openai_chat_completion"
    )]
    OpenAiChat,
    #[serde(rename = "openai_responses", alias = "responses")]
    OpenAiResponses,
    #[serde(rename = "anthropic_messages", alias = "anthropic", alias = "messages")]
    AnthropicMessages,
}

impl FormatKind {
    /// Look up a format by its canonical name or a common alias.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "openai_chat" | "openai" | "chat" | "openai_chat_completion" => Some(Self::OpenAiChat),
            "openai_responses" | "responses" => Some(Self::OpenAiResponses),
            "anthropic_messages" | "anthropic" | "messages" => Some(Self::AnthropicMessages),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAiChat => "openai_chat",
            Self::OpenAiResponses => "openai_responses",
            Self::AnthropicMessages => "anthropic_messages",
        }
    }

    pub fn adapter(self) -> Arc<dyn ChatFormat> {
        match self {
            Self::OpenAiChat => Arc::new(OpenAiChatCompletion),
            Self::OpenAiResponses => Arc::new(OpenAiResponses),
            Self::AnthropicMessages => Arc::new(AnthropicMessages),
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::OpenAiChat, Self::OpenAiResponses, Self::AnthropicMessages]
    }
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| {
            BridgeError::config(format!(
                "unknown format '{s}' (expected one of: openai_chat, openai_responses, anthropic_messages)"
            ))
        })
    }
}

/// Serialize `body` and merge `extra` over its top-level keys.
pub(crate) fn finish_body<T: Serialize>(body: &T, extra: &JsonObject) -> Result<Vec<u8>> {
    let mut object = JsonValue::encode(body)?
        .expect_object()
        .map_err(|e| BridgeError::serialization(e.to_string()))?;
    object.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    JsonValue::Object(object).to_vec()
}

/// Recognise the error bodies shared by all supported providers:
/// `{"error": {"message", "code"?, "type"?}}`, `{"error": "text"}` and `{"detail": "text"}`.
pub fn parse_error_body(data: &[u8]) -> Option<ErrorInfo> {
    let value = JsonValue::from_slice(data).ok()?;

    match value.get("error") {
        Some(JsonValue::Object(error)) => {
            let message = error
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("Unknown Error")
                .to_string();
            let code = error.get("code").and_then(JsonValue::as_i64).unwrap_or(500);
            let kind = error
                .get("type")
                .and_then(JsonValue::as_str)
                .or_else(|| error.get("code").and_then(JsonValue::as_str))
                .map(String::from);
            return Some(ErrorInfo {
                code,
                kind,
                message,
            });
        }
        Some(JsonValue::String(message)) => {
            return Some(ErrorInfo {
                code: 500,
                kind: None,
                message: message.clone(),
            });
        }
        _ => {}
    }

    let detail = value.get("detail").and_then(JsonValue::as_str)?;
    Some(ErrorInfo {
        code: 400,
        kind: None,
        message: detail.to_string(),
    })
}

/// Non-empty string, or `None`.
pub(crate) fn non_empty(text: Option<String>) -> Option<String> {
    text.filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_names_and_aliases() {
        assert_eq!(FormatKind::from_name("openai"), Some(FormatKind::OpenAiChat));
        assert_eq!(FormatKind::from_name("Responses"), Some(FormatKind::OpenAiResponses));
        assert_eq!(
            FormatKind::from_name("anthropic-messages"),
            Some(FormatKind::AnthropicMessages)
        );
        assert!(FormatKind::from_name("gemini").is_none());
        assert!("gemini".parse::<FormatKind>().is_err());

        for kind in FormatKind::all() {
            assert_eq!(kind.to_string().parse::<FormatKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_adapter_metadata() {
        let chat = FormatKind::OpenAiChat.adapter();
        assert_eq!(chat.endpoint_path(), "/v1/chat/completions");
        assert_eq!(chat.format_name(), "openai_chat_completion");

        let responses = FormatKind::OpenAiResponses.adapter();
        assert_eq!(responses.endpoint_path(), "/responses");
        assert_eq!(responses.format_name(), "openai_responses");

        let anthropic = FormatKind::AnthropicMessages.adapter();
        assert_eq!(anthropic.endpoint_path(), "/v1/messages");
        assert_eq!(anthropic.format_name(), "anthropic_messages");
        assert!(anthropic
            .default_headers()
            .contains(&("anthropic-version", "2023-06-01")));

        for kind in FormatKind::all() {
            assert!(kind.adapter().supports_streaming());
        }
    }

    #[test]
    fn test_extra_fields_win() {
        let body = serde_json::json!({"model": "a", "stream": true});
        let mut extra = JsonObject::new();
        extra.insert("model".to_string(), JsonValue::from("b"));
        extra.insert("seed".to_string(), JsonValue::from(7_i64));

        let bytes = finish_body(&body, &extra).unwrap();
        let merged: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(merged["model"], "b");
        assert_eq!(merged["seed"], 7);
        assert_eq!(merged["stream"], true);
    }

    #[test]
    fn test_parse_error_object() {
        let info = parse_error_body(
            br#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","code":401}}"#,
        )
        .unwrap();
        assert_eq!(info.code, 401);
        assert_eq!(info.kind.as_deref(), Some("invalid_request_error"));
        assert_eq!(info.message, "Incorrect API key");
    }

    #[test]
    fn test_parse_error_defaults() {
        let info = parse_error_body(br#"{"error":{"code":"rate_limit_exceeded"}}"#).unwrap();
        assert_eq!(info.code, 500);
        assert_eq!(info.message, "Unknown Error");
        assert_eq!(info.kind.as_deref(), Some("rate_limit_exceeded"));
    }

    #[test]
    fn test_parse_error_detail_and_string() {
        let info = parse_error_body(br#"{"detail":"Unsupported model"}"#).unwrap();
        assert_eq!((info.code, info.message.as_str()), (400, "Unsupported model"));

        let info = parse_error_body(br#"{"error":"overloaded"}"#).unwrap();
        assert_eq!(info.message, "overloaded");
    }

    #[test]
    fn test_parse_error_unknown_shapes() {
        assert!(parse_error_body(b"<html>502</html>").is_none());
        assert!(parse_error_body(br#"{"choices":[]}"#).is_none());
    }
}
