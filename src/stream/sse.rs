//! Best-effort recovery of one JSON payload from a raw streaming chunk.
//!
//! Transports hand adapters whatever they received for one event: usually the bare
//! JSON of an SSE `data:` field, sometimes the whole SSE frame (`event: ...\ndata: {...}`),
//! sometimes the `[DONE]` sentinel. [`decode_frame`] accepts all three uniformly and
//! only reports an error when a non-empty, non-sentinel chunk yields nothing decodable.

use serde::de::DeserializeOwned;

use crate::error::{BridgeError, Result};

/// Stream-end sentinel sent by OpenAI-compatible servers. Compared case-insensitively.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Outcome of frame recovery for one raw chunk.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame<T> {
    /// The chunk (or its first data line) decoded against the expected schema.
    Event(T),
    /// The chunk was the stream-end sentinel.
    Done,
    /// The chunk carried nothing: empty bytes, whitespace, or an empty `data:` line.
    Empty,
}

impl<T> Frame<T> {
    pub fn into_event(self) -> Option<T> {
        match self {
            Frame::Event(event) => Some(event),
            Frame::Done | Frame::Empty => None,
        }
    }
}

#[must_use]
pub fn is_done_sentinel(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(DONE_SENTINEL)
}

/// Values of every `data:` line, in order. The prefix match is case-insensitive and
/// the value is everything after the first colon, trimmed.
#[must_use]
pub fn data_lines(text: &str) -> Vec<&str> {
    text.lines()
        .map(str::trim)
        .filter(|line| {
            line.get(..5)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("data:"))
        })
        .map(|line| line[5..].trim())
        .collect()
}

/// Decode `data` with `decode`, falling back to SSE frame recovery when the raw bytes
/// do not decode.
///
/// With several data lines the first one wins; later lines are ignored.
pub fn decode_frame<T, F>(data: &[u8], decode: F) -> Result<Frame<T>>
where
    F: Fn(&[u8]) -> Result<T>,
{
    if data.is_empty() {
        return Ok(Frame::Empty);
    }

    let first_error = match decode(data) {
        Ok(event) => return Ok(Frame::Event(event)),
        Err(e) => e,
    };

    let text = std::str::from_utf8(data)
        .map_err(|e| BridgeError::invalid_payload(format!("chunk is not valid UTF-8: {e}")))?;
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return Ok(Frame::Empty);
    }
    if is_done_sentinel(trimmed) {
        return Ok(Frame::Done);
    }

    let Some(&value) = data_lines(trimmed).first() else {
        return Err(BridgeError::invalid_payload(format!(
            "no data line in chunk ({first_error})"
        )));
    };

    if value.is_empty() {
        return Ok(Frame::Empty);
    }
    if is_done_sentinel(value) {
        return Ok(Frame::Done);
    }

    decode(value.as_bytes())
        .map(Frame::Event)
        .map_err(|e| BridgeError::invalid_payload(e.to_string()))
}

/// [`decode_frame`] with a plain `serde_json` decoder for `T`.
pub fn decode_json_frame<T: DeserializeOwned>(data: &[u8]) -> Result<Frame<T>> {
    decode_frame(data, |bytes| {
        serde_json::from_slice(bytes).map_err(|e| BridgeError::decode(e.to_string()))
    })
}
