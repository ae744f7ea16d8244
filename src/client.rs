//! HTTP transport: request composition, non-streamed completion and SSE streaming.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};
use crate::format::canonical_types::{ChatRequest, ChatResponse};
use crate::format::{ChatFormat, FormatKind};
use crate::json::JsonValue;
use crate::logging::SharedTraceLog;
use crate::stream::reasoning::extract_reasoning;
use crate::stream::{normalize, transport_events, ChatStream, StreamSession};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Whole-request limit for non-streamed completions. Streams have none.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Body fields the ChatGPT Codex backend rejects.
const CODEX_UNSUPPORTED_FIELDS: &[&str] = &[
    "temperature",
    "top_p",
    "max_output_tokens",
    "user",
    "text_formatting",
    "truncation",
    "text",
    "service_tier",
];

pub struct ChatClient {
    http: reqwest::Client,
    config: BridgeConfig,
    kind: FormatKind,
    format: Arc<dyn ChatFormat>,
    token: String,
    trace: Option<SharedTraceLog>,
}

impl ChatClient {
    /// Build a client whose bearer token comes from the configured environment variable.
    pub fn new(config: BridgeConfig) -> Result<Self> {
        let token = config.resolve_api_key()?;
        Self::with_bearer_token(config, token)
    }

    /// Build a client with an explicit bearer token, e.g. one obtained through OAuth.
    pub fn with_bearer_token(config: BridgeConfig, token: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let trace = match &config.trace_log {
            Some(path) => Some(SharedTraceLog::open(path)?),
            None => None,
        };
        let kind = config.effective_format();
        Ok(Self {
            http,
            kind,
            format: kind.adapter(),
            token: token.into(),
            trace,
            config,
        })
    }

    #[must_use]
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    #[must_use]
    pub fn with_trace(mut self, trace: SharedTraceLog) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn format(&self) -> FormatKind {
        self.kind
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn trace(&self) -> Option<&SharedTraceLog> {
        self.trace.as_ref()
    }

    pub fn endpoint_url(&self) -> Result<String> {
        Ok(endpoint_url(
            &self.config.effective_base_url()?,
            self.format.endpoint_path(),
        ))
    }

    /// Serialize `request` for the configured format, with `[extra]` merged and
    /// dropped keys removed.
    pub fn prepare_body(&self, request: &ChatRequest, url: &str) -> Result<Vec<u8>> {
        let body = self
            .format
            .prepare_request(request, &self.config.provider.model, &self.config.extra)?;

        let mut drop: Vec<&str> = self.config.params.drop.iter().map(String::as_str).collect();
        if is_chatgpt_codex(url) {
            drop.extend_from_slice(CODEX_UNSUPPORTED_FIELDS);
        }
        if drop.is_empty() {
            return Ok(body);
        }

        let mut object = JsonValue::from_slice(&body)?.expect_object()?;
        for key in drop {
            if object.remove(key).is_some() {
                debug!(key, "dropped request field");
            }
        }
        JsonValue::from(object).to_vec()
    }

    pub fn headers(&self, url: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", self.token))?);
        if self.kind == FormatKind::AnthropicMessages {
            headers.insert("x-api-key", header_value(&self.token)?);
        }
        for (name, value) in self.format.default_headers() {
            headers.insert(name, HeaderValue::from_static(value));
        }
        if is_chatgpt_codex(url) {
            headers
                .entry("openai-beta")
                .or_insert(HeaderValue::from_static("responses=experimental"));
            headers
                .entry("codex-task-type")
                .or_insert(HeaderValue::from_static("standard"));
        }
        // Configured headers win, Authorization included.
        for (name, value) in &self.config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| BridgeError::config(format!("invalid header name '{name}': {e}")))?;
            headers.insert(name, header_value(value)?);
        }
        Ok(headers)
    }

    async fn send(&self, request: &ChatRequest, session: uuid::Uuid) -> Result<reqwest::Response> {
        let url = self.endpoint_url()?;
        let body = self.prepare_body(request, &url)?;
        let headers = self.headers(&url)?;

        info!(
            url = %url,
            model = %self.config.provider.model,
            format = %self.kind,
            stream = request.stream.unwrap_or(false),
            "POST"
        );
        debug!(headers = ?masked(&headers), "request headers");
        if let Some(trace) = &self.trace {
            trace.request(session, &url, &body);
        }

        let mut builder = self.http.post(&url).headers(headers).body(body);
        if let Some(timeout) = request_timeout(request) {
            builder = builder.timeout(timeout);
        }
        let response = builder.send().await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let err = status_error(self.format.as_ref(), status.as_u16(), response.bytes().await);
        warn!(status = status.as_u16(), error = %err, "request failed");
        if let Some(trace) = &self.trace {
            trace.error(session, &err);
        }
        Err(err)
    }

    /// Send a non-streamed request and decode the full response.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let mut request = request.clone();
        request.stream = Some(false);
        let session = uuid::Uuid::new_v4();

        let body = self.send(&request, session).await?.bytes().await?;

        let mut response = match self.format.parse_response(&body) {
            Ok(response) => response,
            Err(err) => {
                let err = self.format.parse_error(&body).map_or(err, BridgeError::Api);
                if let Some(trace) = &self.trace {
                    trace.error(session, &err);
                }
                return Err(err);
            }
        };

        for choice in &mut response.choices {
            extract_reasoning(&mut choice.message, &self.config.reasoning);
        }
        if let Some(usage) = response.usage {
            info!(
                prompt = usage.prompt_tokens,
                completion = usage.completion_tokens,
                "completed"
            );
        }
        Ok(response)
    }

    /// Send a streamed request. Chunks arrive in order, finalized tool calls last.
    pub async fn stream(&self, request: &ChatRequest) -> Result<ChatStream> {
        if !self.format.supports_streaming() {
            return Err(BridgeError::config(format!(
                "{} does not support streaming",
                self.format.format_name()
            )));
        }
        let mut request = request.clone();
        request.stream = Some(true);

        let mut session = StreamSession::new(self.format.clone(), self.config.reasoning.clone());
        if let Some(trace) = &self.trace {
            session = session.with_trace(trace.clone());
        }

        let response = self.send(&request, session.id()).await?;
        let events = transport_events(response.bytes_stream());
        Ok(Box::pin(normalize(events, session)))
    }
}

/// Join a base URL and an adapter path.
///
/// A base that already names an endpoint is used as is. ChatGPT Codex bases get
/// `/responses` without a version prefix, and a base ending in `/v1` does not get
/// the path's `/v1` a second time.
pub fn endpoint_url(base_url: &str, api_path: &str) -> String {
    if base_url.ends_with("/responses") || base_url.ends_with("/chat/completions") {
        return base_url.to_string();
    }

    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    if is_chatgpt_codex(base) {
        return format!("{base}/responses");
    }
    if let Some(rest) = api_path.strip_prefix("/v1/") {
        if base.ends_with("/v1") {
            return format!("{base}/{rest}");
        }
    }
    if api_path.starts_with('/') {
        format!("{base}{api_path}")
    } else {
        format!("{base}/{api_path}")
    }
}

pub fn is_chatgpt_codex(url: &str) -> bool {
    let url = url.to_lowercase();
    url.contains("chatgpt.com") && url.contains("/backend-api/codex")
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| BridgeError::config(format!("invalid header value: {e}")))
}

fn masked(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if name == AUTHORIZATION || name.as_str() == "x-api-key" {
                "***masked***".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.to_string(), shown)
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

fn request_timeout(request: &ChatRequest) -> Option<Duration> {
    match request.stream {
        Some(true) => None,
        _ => Some(REQUEST_TIMEOUT),
    }
}

/// Map a non-2xx response to an error, decoding the provider's error body when it has one.
fn status_error<E: fmt::Display>(
    format: &dyn ChatFormat,
    status: u16,
    body: std::result::Result<Bytes, E>,
) -> BridgeError {
    let body = match body {
        Ok(body) => body,
        Err(e) => {
            return BridgeError::transport(
                Some(status),
                format!("provider returned status {status}; reading the error body failed: {e}"),
            )
        }
    };
    match format.parse_error(&body) {
        Some(info) => BridgeError::Api(info),
        None => BridgeError::transport(
            Some(status),
            format!(
                "provider returned status {status}: {}",
                truncate(&String::from_utf8_lossy(&body), 500)
            ),
        ),
    }
}
