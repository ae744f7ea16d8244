//! Splits inline `<think>...</think>` markup out of plain content.
//!
//! Some backends stream their chain of thought inside the ordinary content channel,
//! wrapped in a start/end token pair, instead of using a dedicated reasoning field.
//! [`ReasoningSplitter`] watches the content of each chunk and reroutes the wrapped
//! spans to [`Delta::reasoning`]. Backends that already send a reasoning field are
//! self-describing: the first time one is seen, splitting is switched off for the rest
//! of the stream.

use serde::{Deserialize, Serialize};

use crate::format::canonical_types::{Delta, ResponseMessage, StreamChunk};

pub const REASONING_START_TOKEN: &str = "<think>";
pub const REASONING_END_TOKEN: &str = "</think>";

/// The markup pair delimiting inline reasoning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReasoningTokens {
    #[serde(default = "default_start_token")]
    pub start_token: String,
    #[serde(default = "default_end_token")]
    pub end_token: String,
}

fn default_start_token() -> String {
    REASONING_START_TOKEN.to_string()
}

fn default_end_token() -> String {
    REASONING_END_TOKEN.to_string()
}

impl Default for ReasoningTokens {
    fn default() -> Self {
        Self {
            start_token: default_start_token(),
            end_token: default_end_token(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Content(&'a str),
    Reasoning(&'a str),
}

impl Segment<'_> {
    fn into_delta(self, index: u32) -> Delta {
        match self {
            Segment::Content(text) => Delta::content(index, text),
            Segment::Reasoning(text) => Delta::reasoning(index, text),
        }
    }
}

/// Per-stream splitter state. One instance per stream; never shared.
#[derive(Debug, Clone)]
pub struct ReasoningSplitter {
    tokens: ReasoningTokens,
    inside_reasoning: bool,
    enabled: bool,
}

impl Default for ReasoningSplitter {
    fn default() -> Self {
        Self::new(ReasoningTokens::default())
    }
}

impl ReasoningSplitter {
    pub fn new(tokens: ReasoningTokens) -> Self {
        Self {
            tokens,
            inside_reasoning: false,
            enabled: true,
        }
    }

    #[must_use]
    pub fn is_inside_reasoning(&self) -> bool {
        self.inside_reasoning
    }

    /// False once the backend has shown it uses a dedicated reasoning field.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Forget everything seen so far, ready for a new stream.
    pub fn reset(&mut self) {
        self.inside_reasoning = false;
        self.enabled = true;
    }

    /// Rewrite the content of `chunk` in place.
    ///
    /// Emitted deltas keep their relative order: content before the start token,
    /// then reasoning, then content after the end token. Role, tool-call fragments
    /// and finish reasons of the original deltas are preserved.
    pub fn apply(&mut self, chunk: &mut StreamChunk) {
        if !self.enabled {
            return;
        }
        if chunk.choices.iter().any(|d| d.reasoning.is_some()) {
            self.enabled = false;
            return;
        }

        let buffer = chunk.content();
        let segments = if self.inside_reasoning {
            if buffer.is_empty() {
                return;
            }
            self.split_inside(&buffer)
        } else {
            match self.split_outside(&buffer) {
                Some(segments) => segments,
                None => return,
            }
        };

        rewrite(chunk, segments);
    }

    /// Not inside reasoning: `None` means no start token, leave the chunk untouched.
    fn split_outside<'a>(&mut self, buffer: &'a str) -> Option<Vec<Segment<'a>>> {
        let start = buffer.find(&self.tokens.start_token)?;
        let before = buffer[..start].trim_end();
        let after = buffer[start + self.tokens.start_token.len()..].trim_start();

        let mut segments = Vec::with_capacity(3);
        push_content(&mut segments, before);

        if let Some(end) = after.find(&self.tokens.end_token) {
            let reasoning = after[..end].trim_end();
            let remaining = after[end + self.tokens.end_token.len()..].trim_start();
            push_reasoning(&mut segments, reasoning);
            push_content(&mut segments, remaining);
        } else {
            // TODO: hold back a trailing prefix of the end token (e.g. "</thi") until the
            // next chunk so a token split across chunks is still recognised.
            self.inside_reasoning = true;
            push_reasoning(&mut segments, after);
        }

        Some(segments)
    }

    fn split_inside<'a>(&mut self, buffer: &'a str) -> Vec<Segment<'a>> {
        let Some(end) = buffer.find(&self.tokens.end_token) else {
            return vec![Segment::Reasoning(buffer)];
        };

        self.inside_reasoning = false;
        let reasoning = buffer[..end].trim_end();
        let remaining = buffer[end + self.tokens.end_token.len()..].trim_start();

        let mut segments = Vec::with_capacity(2);
        push_reasoning(&mut segments, reasoning);
        push_content(&mut segments, remaining);
        segments
    }
}

fn push_content<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Content(text));
    }
}

fn push_reasoning<'a>(segments: &mut Vec<Segment<'a>>, text: &'a str) {
    if !text.is_empty() {
        segments.push(Segment::Reasoning(text));
    }
}

/// Replace the content of every delta with `segments`, keeping everything else.
fn rewrite(chunk: &mut StreamChunk, segments: Vec<Segment<'_>>) {
    let index = chunk
        .choices
        .iter()
        .find(|d| d.content.is_some())
        .map_or(0, |d| d.index);

    let mut role = None;
    let mut rest = Vec::new();
    for mut delta in chunk.choices.drain(..) {
        delta.content = None;
        if role.is_none() {
            role = delta.role.take();
        }
        if !delta.is_empty() {
            rest.push(delta);
        }
    }

    let mut out: Vec<Delta> = segments.into_iter().map(|s| s.into_delta(index)).collect();
    if let Some(role) = role {
        match out.first_mut() {
            Some(first) => first.role = Some(role),
            None => out.push(Delta {
                index,
                role: Some(role),
                ..Delta::default()
            }),
        }
    }
    out.extend(rest);
    chunk.choices = out;
}

/// Split a complete, non-streamed message whose whole content is
/// `<ws> START reasoning END remaining`.
///
/// Messages that already carry reasoning, or whose content does not start with the
/// start token, are left untouched.
pub fn extract_reasoning(message: &mut ResponseMessage, tokens: &ReasoningTokens) {
    if message.reasoning.as_deref().is_some_and(|r| !r.is_empty()) {
        return;
    }
    let Some(content) = message.content.as_deref() else {
        return;
    };
    let Some(rest) = content.trim_start().strip_prefix(tokens.start_token.as_str()) else {
        return;
    };
    let Some(end) = rest.rfind(&tokens.end_token) else {
        return;
    };

    let reasoning = rest[..end].trim().to_string();
    let remaining = rest[end + tokens.end_token.len()..].trim().to_string();
    message.reasoning = Some(reasoning);
    message.content = Some(remaining);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::canonical_types::ToolCallFragment;

    fn text_chunk(text: &str) -> StreamChunk {
        StreamChunk::from_delta(Delta::content(0, text))
    }

    fn split(splitter: &mut ReasoningSplitter, text: &str) -> (String, String) {
        let mut chunk = text_chunk(text);
        splitter.apply(&mut chunk);
        (chunk.content(), chunk.reasoning())
    }

    #[test]
    fn test_plain_text_passes_through() {
        let mut splitter = ReasoningSplitter::default();
        let mut chunk = text_chunk("hello world");
        let before = chunk.clone();
        splitter.apply(&mut chunk);
        assert_eq!(chunk, before);
        assert!(!splitter.is_inside_reasoning());
    }

    #[test]
    fn test_self_contained_block() {
        let mut splitter = ReasoningSplitter::default();
        let mut chunk = text_chunk("Sure. <think> weigh options </think>  Answer: 42");
        splitter.apply(&mut chunk);

        let kinds: Vec<(Option<&str>, Option<&str>)> = chunk
            .choices
            .iter()
            .map(|d| (d.content.as_deref(), d.reasoning.as_deref()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (Some("Sure."), None),
                (None, Some("weigh options")),
                (Some("Answer: 42"), None),
            ]
        );
        assert!(!splitter.is_inside_reasoning());
    }

    #[test]
    fn test_block_spanning_chunks() {
        let mut splitter = ReasoningSplitter::default();

        let (content, reasoning) = split(&mut splitter, "<think>step one, ");
        assert_eq!((content.as_str(), reasoning.as_str()), ("", "step one, "));
        assert!(splitter.is_inside_reasoning());

        let (content, reasoning) = split(&mut splitter, "step two");
        assert_eq!((content.as_str(), reasoning.as_str()), ("", "step two"));

        let (content, reasoning) = split(&mut splitter, " done.</think>\n\nThe answer");
        assert_eq!((content.as_str(), reasoning.as_str()), ("The answer", " done."));
        assert!(!splitter.is_inside_reasoning());

        let (content, reasoning) = split(&mut splitter, " is 4.");
        assert_eq!((content.as_str(), reasoning.as_str()), (" is 4.", ""));
    }

    #[test]
    fn test_concatenation_reconstructs_original() {
        let original = "Intro <think>a b c d</think> outro text";
        for cut in 1..original.len() {
            if !original.is_char_boundary(cut) {
                continue;
            }
            let (left, right) = original.split_at(cut);
            let end_at = original.find(REASONING_END_TOKEN).unwrap();
            let start_at = original.find(REASONING_START_TOKEN).unwrap();
            let splits_token = (cut > end_at && cut < end_at + REASONING_END_TOKEN.len())
                || (cut > start_at && cut < start_at + REASONING_START_TOKEN.len());
            if splits_token {
                continue;
            }

            let mut splitter = ReasoningSplitter::default();
            let (c1, r1) = split(&mut splitter, left);
            let (c2, r2) = split(&mut splitter, right);
            let content = format!("{c1}{c2}");
            let reasoning = format!("{r1}{r2}");

            assert_eq!(
                content.replace(' ', ""),
                "Introoutrotext",
                "cut at {cut}: {left:?} | {right:?}"
            );
            assert_eq!(reasoning.replace(' ', ""), "abcd", "cut at {cut}");
        }
    }

    #[test]
    fn test_dedicated_reasoning_field_disables_splitting() {
        let mut splitter = ReasoningSplitter::default();
        let mut chunk = StreamChunk::from_delta(Delta::reasoning(0, "native"));
        splitter.apply(&mut chunk);
        assert!(!splitter.is_enabled());

        let mut chunk = text_chunk("<think>not reasoning</think>");
        splitter.apply(&mut chunk);
        assert_eq!(chunk.content(), "<think>not reasoning</think>");
        assert_eq!(chunk.reasoning(), "");
    }

    #[test]
    fn test_role_tool_calls_and_finish_reason_survive() {
        let mut splitter = ReasoningSplitter::default();
        let mut chunk = StreamChunk::from_delta(Delta {
            index: 0,
            role: Some("assistant".to_string()),
            content: Some("<think>plan".to_string()),
            ..Delta::default()
        });
        splitter.apply(&mut chunk);
        assert_eq!(chunk.choices[0].role.as_deref(), Some("assistant"));
        assert_eq!(chunk.choices[0].reasoning.as_deref(), Some("plan"));

        let mut chunk = StreamChunk {
            choices: vec![
                Delta::content(0, "more</think>"),
                Delta {
                    index: 0,
                    tool_calls: Some(vec![ToolCallFragment {
                        index: Some(0),
                        name: Some("echo".to_string()),
                        ..ToolCallFragment::default()
                    }]),
                    finish_reason: Some("tool_calls".to_string()),
                    ..Delta::default()
                },
            ],
            ..StreamChunk::default()
        };
        splitter.apply(&mut chunk);
        assert_eq!(chunk.choices.len(), 2);
        assert_eq!(chunk.choices[0].reasoning.as_deref(), Some("more"));
        assert!(chunk.choices[1].tool_calls.is_some());
        assert_eq!(chunk.choices[1].finish_reason.as_deref(), Some("tool_calls"));
    }

    #[test]
    fn test_inside_reasoning_ignores_chunks_without_content() {
        let mut splitter = ReasoningSplitter::default();
        split(&mut splitter, "<think>");
        assert!(splitter.is_inside_reasoning());

        let mut chunk = StreamChunk::from_delta(Delta {
            finish_reason: Some("stop".to_string()),
            ..Delta::default()
        });
        let before = chunk.clone();
        splitter.apply(&mut chunk);
        assert_eq!(chunk, before);
    }

    #[test]
    fn test_custom_tokens() {
        let mut splitter = ReasoningSplitter::new(ReasoningTokens {
            start_token: "[[r]]".to_string(),
            end_token: "[[/r]]".to_string(),
        });
        let (content, reasoning) = split(&mut splitter, "x [[r]]y[[/r]] z");
        assert_eq!((content.as_str(), reasoning.as_str()), ("xz", "y"));
    }

    #[test]
    fn test_reset() {
        let mut splitter = ReasoningSplitter::default();
        split(&mut splitter, "<think>");
        splitter.reset();
        assert!(!splitter.is_inside_reasoning());
        assert!(splitter.is_enabled());
    }

    #[test]
    fn test_extract_reasoning_from_whole_message() {
        let mut message = ResponseMessage {
            role: "assistant".to_string(),
            content: Some("\n<think>\nconsider\n</think>\n\nHello!".to_string()),
            ..ResponseMessage::default()
        };
        extract_reasoning(&mut message, &ReasoningTokens::default());
        assert_eq!(message.reasoning.as_deref(), Some("consider"));
        assert_eq!(message.content.as_deref(), Some("Hello!"));
    }

    #[test]
    fn test_extract_reasoning_leaves_native_reasoning() {
        let mut message = ResponseMessage {
            role: "assistant".to_string(),
            content: Some("<think>x</think>y".to_string()),
            reasoning: Some("native".to_string()),
            tool_calls: None,
        };
        extract_reasoning(&mut message, &ReasoningTokens::default());
        assert_eq!(message.content.as_deref(), Some("<think>x</think>y"));
    }

    #[test]
    fn test_extract_reasoning_requires_leading_token() {
        let mut message = ResponseMessage {
            role: "assistant".to_string(),
            content: Some("prefix <think>x</think>y".to_string()),
            ..ResponseMessage::default()
        };
        extract_reasoning(&mut message, &ReasoningTokens::default());
        assert!(message.reasoning.is_none());
    }
}
