//! JSONL trace log of requests, raw stream events, errors and finalized tool calls.
//!
//! Diagnostics go through `tracing`; the trace log is a separate, optional record of
//! what crossed the wire, kept as a bounded ring in memory and appended to a file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::error::BridgeError;
use crate::format::canonical_types::FinalizedToolCall;
use crate::json::JsonValue;

const MAX_TRACE_ENTRIES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Request,
    Event,
    Error,
    ToolCall,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<Uuid>,
    pub kind: TraceKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,
}

impl TraceEntry {
    pub fn new(kind: TraceKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            session: None,
            kind,
            message: message.into(),
            context: None,
        }
    }

    pub fn with_session(mut self, session: Uuid) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_context(mut self, ctx: JsonValue) -> Self {
        self.context = Some(ctx);
        self
    }
}

/// Ring buffer of trace entries, optionally mirrored to a JSONL file.
pub struct TraceLog {
    entries: VecDeque<TraceEntry>,
    file_path: Option<PathBuf>,
    writer: Option<BufWriter<File>>,
}

impl TraceLog {
    /// Open (or create) a JSONL file, loading the most recent existing entries.
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file_path = file_path.as_ref().to_path_buf();

        if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut entries = VecDeque::with_capacity(MAX_TRACE_ENTRIES);

        if file_path.exists() {
            let reader = BufReader::new(File::open(&file_path)?);
            for line in reader.lines().map_while(std::result::Result::ok) {
                if let Ok(entry) = serde_json::from_str::<TraceEntry>(&line) {
                    if entries.len() >= MAX_TRACE_ENTRIES {
                        entries.pop_front();
                    }
                    entries.push_back(entry);
                }
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&file_path)?;

        Ok(Self {
            entries,
            file_path: Some(file_path),
            writer: Some(BufWriter::new(file)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            entries: VecDeque::new(),
            file_path: None,
            writer: None,
        }
    }

    pub fn record(&mut self, entry: TraceEntry) {
        if let Some(ref mut writer) = self.writer {
            if let Ok(json) = serde_json::to_string(&entry) {
                let _ = writeln!(writer, "{json}");
                let _ = writer.flush();
            }
        }
        if self.entries.len() >= MAX_TRACE_ENTRIES {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Most recent entries first.
    pub fn recent(&self, limit: usize) -> Vec<TraceEntry> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }

    pub fn last_error(&self) -> Option<TraceEntry> {
        self.entries
            .iter()
            .rev()
            .find(|e| e.kind == TraceKind::Error)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Rewrite the file with only the entries still held in memory.
    pub fn compact(&mut self) -> std::io::Result<()> {
        let Some(path) = self.file_path.clone() else {
            return Ok(());
        };
        self.writer = None;
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;
        let mut writer = BufWriter::new(file);
        for entry in &self.entries {
            if let Ok(json) = serde_json::to_string(entry) {
                writeln!(writer, "{json}")?;
            }
        }
        writer.flush()?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }
}

#[derive(Clone)]
pub struct SharedTraceLog(Arc<Mutex<TraceLog>>);

impl std::fmt::Debug for SharedTraceLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTraceLog").finish_non_exhaustive()
    }
}

impl SharedTraceLog {
    pub fn open(file_path: impl AsRef<Path>) -> std::io::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(TraceLog::open(file_path)?))))
    }

    pub fn in_memory() -> Self {
        Self(Arc::new(Mutex::new(TraceLog::in_memory())))
    }

    pub fn record(&self, entry: TraceEntry) {
        if let Ok(mut log) = self.0.lock() {
            log.record(entry);
        }
    }

    pub fn request(&self, session: Uuid, url: &str, body: &[u8]) {
        let context = JsonValue::from_slice(body)
            .unwrap_or_else(|_| JsonValue::from(String::from_utf8_lossy(body).into_owned()));
        self.record(
            TraceEntry::new(TraceKind::Request, format!("POST {url}"))
                .with_session(session)
                .with_context(context),
        );
    }

    pub fn event(&self, session: Uuid, event: Option<&str>, id: Option<&str>, data: &[u8]) {
        let mut context = crate::json::JsonObject::new();
        if let Some(id) = id {
            context.insert("id".to_string(), JsonValue::from(id));
        }
        context.insert(
            "data".to_string(),
            JsonValue::from(String::from_utf8_lossy(data).into_owned()),
        );
        self.record(
            TraceEntry::new(TraceKind::Event, event.unwrap_or("message"))
                .with_session(session)
                .with_context(JsonValue::from(context)),
        );
    }

    pub fn error(&self, session: Uuid, error: &BridgeError) {
        self.record(TraceEntry::new(TraceKind::Error, error.to_string()).with_session(session));
    }

    pub fn tool_call(&self, session: Uuid, call: &FinalizedToolCall) {
        let context = JsonValue::encode(call).unwrap_or(JsonValue::Null);
        self.record(
            TraceEntry::new(TraceKind::ToolCall, call.name.clone())
                .with_session(session)
                .with_context(context),
        );
    }

    pub fn info(&self, message: impl Into<String>) {
        self.record(TraceEntry::new(TraceKind::Info, message));
    }

    pub fn recent(&self, limit: usize) -> Vec<TraceEntry> {
        self.0.lock().map(|l| l.recent(limit)).unwrap_or_default()
    }

    /// The most recently recorded error, if any.
    pub fn last_error(&self) -> Option<TraceEntry> {
        self.0.lock().ok().and_then(|l| l.last_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_ring_keeps_most_recent() {
        let mut log = TraceLog::in_memory();
        for i in 0..(MAX_TRACE_ENTRIES + 5) {
            log.record(TraceEntry::new(TraceKind::Info, i.to_string()));
        }
        assert_eq!(log.len(), MAX_TRACE_ENTRIES);
        assert_eq!(log.recent(1)[0].message, (MAX_TRACE_ENTRIES + 4).to_string());
    }

    #[test]
    fn test_last_error() {
        let log = SharedTraceLog::in_memory();
        let session = Uuid::new_v4();
        assert!(log.last_error().is_none());

        log.error(session, &BridgeError::upstream("first"));
        log.info("between");
        log.error(session, &BridgeError::upstream("boom"));
        log.info("after");

        let last = log.last_error().unwrap();
        assert_eq!(last.message, "boom");
        assert_eq!(last.session, Some(session));
    }

    #[test]
    fn test_persists_and_reloads_jsonl() {
        let file = NamedTempFile::new().unwrap();
        let session = Uuid::new_v4();
        {
            let log = SharedTraceLog::open(file.path()).unwrap();
            log.request(session, "https://api.example.com/v1/chat/completions", br#"{"model":"m"}"#);
            log.event(session, Some("message_start"), Some("1"), b"{}");
            log.tool_call(
                session,
                &FinalizedToolCall {
                    id: Some("call_1".to_string()),
                    name: "echo".to_string(),
                    args: "{}".to_string(),
                },
            );
        }

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 3);

        let reloaded = TraceLog::open(file.path()).unwrap();
        let recent = reloaded.recent(10);
        assert_eq!(recent[0].kind, TraceKind::ToolCall);
        assert_eq!(recent[1].message, "message_start");
        assert_eq!(
            recent[2].context.as_ref().and_then(|c| c.get("model")).and_then(JsonValue::as_str),
            Some("m")
        );
    }

    #[test]
    fn test_compact_rewrites_file() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), "not json\n").unwrap();

        let mut log = TraceLog::open(file.path()).unwrap();
        assert!(log.is_empty());
        log.record(TraceEntry::new(TraceKind::Info, "kept"));
        log.compact().unwrap();

        let contents = std::fs::read_to_string(file.path()).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("kept"));
    }
}
