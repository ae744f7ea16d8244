//! One chat request/response shape for OpenAI Chat Completions, OpenAI Responses
//! and Anthropic Messages, including their streaming variants.

pub mod client;
pub mod config;
pub mod error;
pub mod format;
pub mod json;
pub mod logging;
pub mod providers;
pub mod stream;

pub use client::ChatClient;
pub use config::BridgeConfig;
pub use error::{BridgeError, ErrorInfo, Result};
pub use format::canonical_types::{
    ChatMessage, ChatRequest, ChatResponse, Delta, FinalizedToolCall, StreamChunk,
    ToolCallFragment,
};
pub use format::{ChatFormat, FormatKind};
pub use json::{JsonObject, JsonValue};
pub use logging::SharedTraceLog;
pub use stream::{normalize, ChatStream, RawEvent, StreamItem, StreamSession, TransportEvent};
