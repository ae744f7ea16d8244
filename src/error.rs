//! Error types for the bridge.

use std::fmt;

use thiserror::Error;

/// A human-readable error extracted from a provider's error body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    /// Numeric code when the provider sent one, otherwise a default
    /// (500 for `{"error": ...}` bodies, 400 for `{"detail": ...}` bodies).
    pub code: i64,
    /// Provider error type or string code, e.g. `invalid_request_error`.
    pub kind: Option<String>,
    pub message: String,
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Decode error: {message}")]
    Decode { message: String },

    /// `terminal` is set when the payload was a provider failure marker with
    /// nothing usable in it; the stream ends all the same.
    #[error("Invalid streaming payload: {message}")]
    InvalidStreamingPayload { message: String, terminal: bool },

    /// A provider-side terminal failure event. Displays the provider's message verbatim.
    #[error("{message}")]
    Upstream { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Server returned an error: {0}")]
    Api(ErrorInfo),

    #[error("Transport error: {message}")]
    Transport {
        status: Option<u16>,
        message: String,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl BridgeError {
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidStreamingPayload {
            message: msg.into(),
            terminal: false,
        }
    }

    /// A failure marker that carried no usable error message.
    pub fn failed_stream(msg: impl Into<String>) -> Self {
        Self::InvalidStreamingPayload {
            message: msg.into(),
            terminal: true,
        }
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream {
            message: msg.into(),
        }
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    pub fn transport(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::Transport {
            status,
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Whether a stream must stop after surfacing this error.
    ///
    /// Malformed individual events are reported and skipped; provider failure
    /// events and transport failures end the stream.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Upstream { .. }
                | Self::InvalidStreamingPayload { terminal: true, .. }
                | Self::Transport { .. }
                | Self::Http(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
