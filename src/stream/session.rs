//! Per-stream pipeline: adapter decode, reasoning split, tool-call aggregation.

use std::sync::Arc;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{BridgeError, ErrorInfo, Result};
use crate::format::canonical_types::{FinalizedToolCall, StreamChunk};
use crate::format::ChatFormat;
use crate::logging::SharedTraceLog;

use super::reasoning::{ReasoningSplitter, ReasoningTokens};
use super::sse::data_lines;
use super::tool_calls::ToolCallAggregator;
use super::RawEvent;

/// State owned by exactly one stream. Never share a session between streams;
/// call [`StreamSession::reset`] before reusing one.
#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    format: Arc<dyn ChatFormat>,
    tokens: ReasoningTokens,
    splitter: ReasoningSplitter,
    aggregator: ToolCallAggregator,
    trace: Option<SharedTraceLog>,
    failed: bool,
}

impl StreamSession {
    pub fn new(format: Arc<dyn ChatFormat>, tokens: ReasoningTokens) -> Self {
        Self {
            id: Uuid::new_v4(),
            format,
            splitter: ReasoningSplitter::new(tokens.clone()),
            tokens,
            aggregator: ToolCallAggregator::new(),
            trace: None,
            failed: false,
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: SharedTraceLog) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn format(&self) -> &dyn ChatFormat {
        self.format.as_ref()
    }

    pub fn trace(&self) -> Option<&SharedTraceLog> {
        self.trace.as_ref()
    }

    /// Whether a terminal failure has been seen. A failed session ignores further input.
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn splitter(&self) -> &ReasoningSplitter {
        &self.splitter
    }

    pub fn aggregator(&self) -> &ToolCallAggregator {
        &self.aggregator
    }

    /// Start over for a new stream with a fresh id.
    pub fn reset(&mut self) {
        self.id = Uuid::new_v4();
        self.splitter = ReasoningSplitter::new(self.tokens.clone());
        self.aggregator = ToolCallAggregator::new();
        self.failed = false;
    }

    /// Record a transport event, then process its payload.
    pub fn process_event(&mut self, event: &RawEvent) -> Result<Option<StreamChunk>> {
        if let Some(trace) = &self.trace {
            trace.event(self.id, event.event.as_deref(), event.id.as_deref(), &event.data);
        }
        self.process(&event.data)
    }

    /// Run one raw payload through the pipeline.
    ///
    /// `Ok(None)` means nothing observable. An event that carries no content but
    /// matches a known error body surfaces as [`BridgeError::Api`].
    pub fn process(&mut self, data: &[u8]) -> Result<Option<StreamChunk>> {
        if self.failed {
            debug!(session = %self.id, "ignoring event after terminal failure");
            return Ok(None);
        }

        let chunk = match self.format.parse_streaming_chunk(data) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => {
                return match self.error_body(data) {
                    Some(info) => Err(self.fail(BridgeError::Api(info))),
                    None => Ok(None),
                };
            }
            Err(err) => return Err(self.fail(err)),
        };

        let mut chunk = chunk;
        self.splitter.apply(&mut chunk);
        for fragment in chunk
            .choices
            .iter()
            .filter_map(|d| d.tool_calls.as_ref())
            .flatten()
        {
            self.aggregator.submit(fragment);
        }
        Ok(chunk.compact())
    }

    /// Flush the in-flight tool call and hand over everything finalized so far.
    pub fn finish(&mut self) -> Vec<FinalizedToolCall> {
        let calls = self.aggregator.finish();
        if let Some(trace) = &self.trace {
            for call in &calls {
                trace.tool_call(self.id, call);
            }
        }
        calls
    }

    /// Note an error that did not come from this session's own processing.
    pub fn record_error(&mut self, err: &BridgeError) {
        warn!(session = %self.id, error = %err, "stream error");
        if let Some(trace) = &self.trace {
            trace.error(self.id, err);
        }
        if err.is_terminal() {
            self.failed = true;
        }
    }

    fn fail(&mut self, err: BridgeError) -> BridgeError {
        self.record_error(&err);
        err
    }

    fn error_body(&self, data: &[u8]) -> Option<ErrorInfo> {
        if let Some(info) = self.format.parse_error(data) {
            return Some(info);
        }
        let text = std::str::from_utf8(data).ok()?;
        let line = data_lines(text).into_iter().next()?;
        self.format.parse_error(line.as_bytes())
    }
}
