//! Streaming normalization.
//!
//! A transport hands over an ordered sequence of [`TransportEvent`]s. [`normalize`]
//! drives one [`StreamSession`] over them, one event at a time, and yields canonical
//! chunks in arrival order followed by every finalized tool call.

pub mod reasoning;
pub mod session;
pub mod sse;
pub mod tool_calls;

use std::fmt;
use std::pin::Pin;

use bytes::Bytes;
use eventsource_stream::Eventsource;
use futures::stream::{self, Stream, StreamExt};
use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::format::canonical_types::{FinalizedToolCall, StreamChunk};

pub use self::reasoning::{ReasoningSplitter, ReasoningTokens};
pub use self::session::StreamSession;
pub use self::tool_calls::ToolCallAggregator;

/// One server-sent event as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub event: Option<String>,
    pub id: Option<String>,
    pub data: Bytes,
}

impl RawEvent {
    /// An unnamed event carrying only a payload.
    pub fn data(data: impl Into<Bytes>) -> Self {
        Self {
            event: None,
            id: None,
            data: data.into(),
        }
    }
}

impl From<eventsource_stream::Event> for RawEvent {
    fn from(event: eventsource_stream::Event) -> Self {
        // "message" is the SSE default name and carries no information.
        let name = (!event.event.is_empty() && event.event != "message").then_some(event.event);
        Self {
            event: name,
            id: (!event.id.is_empty()).then_some(event.id),
            data: Bytes::from(event.data),
        }
    }
}

#[derive(Debug)]
pub enum TransportEvent {
    Open,
    Message(RawEvent),
    /// A transport-level failure, e.g. a dropped connection.
    Error(BridgeError),
    Closed,
}

/// What a normalized stream yields.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamItem {
    Chunk(StreamChunk),
    ToolCall(FinalizedToolCall),
}

impl StreamItem {
    pub fn as_chunk(&self) -> Option<&StreamChunk> {
        match self {
            Self::Chunk(chunk) => Some(chunk),
            Self::ToolCall(_) => None,
        }
    }

    pub fn as_tool_call(&self) -> Option<&FinalizedToolCall> {
        match self {
            Self::ToolCall(call) => Some(call),
            Self::Chunk(_) => None,
        }
    }
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<StreamItem>> + Send>>;

/// Parse an SSE byte stream into transport events, ending with [`TransportEvent::Closed`].
pub fn transport_events<S, B, E>(body: S) -> impl Stream<Item = TransportEvent> + Send
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let messages = body.eventsource().map(|event| match event {
        Ok(event) => TransportEvent::Message(RawEvent::from(event)),
        Err(e) => TransportEvent::Error(BridgeError::transport(None, e.to_string())),
    });

    stream::once(async { TransportEvent::Open })
        .chain(messages)
        .chain(stream::once(async { TransportEvent::Closed }))
}

/// Drive `session` over `events`.
///
/// Malformed events are yielded as errors and processing continues. A terminal
/// upstream failure is yielded and ends the stream without flushing tool calls.
/// A transport error is yielded, then in-flight tool calls are still flushed.
pub fn normalize<S>(
    events: S,
    mut session: StreamSession,
) -> impl Stream<Item = Result<StreamItem>> + Send
where
    S: Stream<Item = TransportEvent> + Send + 'static,
{
    async_stream::stream! {
        futures::pin_mut!(events);
        info!(
            session = %session.id(),
            format = session.format().format_name(),
            "stream started"
        );

        while let Some(event) = events.next().await {
            match event {
                TransportEvent::Open => debug!(session = %session.id(), "transport open"),
                TransportEvent::Message(raw) => match session.process_event(&raw) {
                    Ok(Some(chunk)) => yield Ok(StreamItem::Chunk(chunk)),
                    Ok(None) => {}
                    Err(err) => {
                        let terminal = err.is_terminal();
                        yield Err(err);
                        if terminal {
                            info!(session = %session.id(), "stream failed");
                            return;
                        }
                    }
                },
                TransportEvent::Error(err) => {
                    session.record_error(&err);
                    yield Err(err);
                    break;
                }
                TransportEvent::Closed => break,
            }
        }

        for call in session.finish() {
            yield Ok(StreamItem::ToolCall(call));
        }
        info!(session = %session.id(), "stream finished");
    }
}
