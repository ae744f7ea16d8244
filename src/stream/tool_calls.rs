//! Reassembly of streamed tool-call fragments.
//!
//! Providers stream a tool call as a run of fragments sharing one index: usually the
//! name first, then the arguments JSON in arbitrary slices. A call is complete once a
//! fragment for a different index arrives or the stream ends.

use tracing::debug;

use crate::format::canonical_types::{FinalizedToolCall, ToolCallFragment};

/// Per-stream accumulator. One instance per stream; never shared.
#[derive(Debug, Default, Clone)]
pub struct ToolCallAggregator {
    current_index: Option<u32>,
    current_id: Option<String>,
    name: String,
    args: String,
    finalized: Vec<FinalizedToolCall>,
}

impl ToolCallAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment.
    ///
    /// A fragment whose index differs from the current one (a missing index included)
    /// closes the call in progress first, even when it carries nothing else.
    pub fn submit(&mut self, fragment: &ToolCallFragment) {
        if self.current_index != fragment.index {
            self.finalize_current();
            self.current_index = fragment.index;
        }

        if fragment.name.is_none() && fragment.arguments_chunk.is_none() && fragment.id.is_none()
        {
            return;
        }

        let name = fragment.name.as_deref().unwrap_or_default();
        let args = fragment.arguments_chunk.as_deref().unwrap_or_default();

        if self.current_id.is_none() {
            self.current_id.clone_from(&fragment.id);
        }
        self.name.push_str(name);
        self.args.push_str(args);
    }

    /// Close the call in progress. A no-op when neither name nor arguments were seen.
    ///
    /// The current index is kept until a fragment with a different one arrives.
    pub fn finalize_current(&mut self) {
        let name = std::mem::take(&mut self.name);
        let args = std::mem::take(&mut self.args);
        let id = self.current_id.take();

        if name.is_empty() && args.is_empty() {
            return;
        }
        if name.is_empty() {
            debug!(index = ?self.current_index, "finalizing tool call without a name");
        }

        debug!(name = %name, index = ?self.current_index, "tool call finalized");
        self.finalized.push(FinalizedToolCall { id, name, args });
    }

    /// Take every call finalized so far, leaving the one in progress untouched.
    pub fn drain(&mut self) -> Vec<FinalizedToolCall> {
        std::mem::take(&mut self.finalized)
    }

    /// End of stream: close the call in progress and take everything.
    pub fn finish(&mut self) -> Vec<FinalizedToolCall> {
        self.finalize_current();
        self.current_index = None;
        self.drain()
    }

    #[must_use]
    pub fn finalized(&self) -> &[FinalizedToolCall] {
        &self.finalized
    }

    /// Whether a call is currently being accumulated.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self.name.is_empty() || !self.args.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frag(index: Option<u32>, name: Option<&str>, args: Option<&str>) -> ToolCallFragment {
        ToolCallFragment {
            index,
            id: None,
            name: name.map(String::from),
            arguments_chunk: args.map(String::from),
        }
    }

    #[test]
    fn test_reassembles_echo_call() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("echo"), Some("")));
        agg.submit(&frag(Some(0), None, Some("{\"x\":")));
        agg.submit(&frag(Some(0), None, Some("1}")));
        assert!(agg.finalized().is_empty());

        let calls = agg.finish();
        assert_eq!(
            calls,
            vec![FinalizedToolCall {
                id: None,
                name: "echo".to_string(),
                args: "{\"x\":1}".to_string(),
            }]
        );
    }

    #[test]
    fn test_index_change_finalizes_previous_call() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("a"), Some("{}")));
        agg.submit(&frag(Some(1), Some("b"), Some("[1]")));

        assert_eq!(agg.finalized().len(), 1);
        assert_eq!(agg.finalized()[0].name, "a");

        let calls = agg.finish();
        let names: Vec<_> = calls.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(calls[1].args, "[1]");
    }

    #[test]
    fn test_split_name_then_next_index() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("ec"), None));
        agg.submit(&frag(Some(0), Some("ho"), None));
        agg.submit(&frag(Some(0), None, Some("{\"a\":1}")));
        agg.submit(&frag(Some(1), Some("next"), Some("{}")));

        let calls = agg.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].name.as_str(), calls[0].args.as_str()), ("echo", "{\"a\":1}"));
        assert_eq!((calls[1].name.as_str(), calls[1].args.as_str()), ("next", "{}"));
    }

    #[test]
    fn test_missing_index_counts_as_a_new_call() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(None, Some("first"), Some("{}")));
        agg.submit(&frag(None, None, Some("")));
        agg.submit(&frag(Some(0), Some("second"), None));
        let names: Vec<_> = agg.finish().into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_nameless_arguments_are_still_finalized() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), None, Some("{\"orphan\":true}")));
        assert!(agg.has_pending());
        let calls = agg.finish();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].name.is_empty());
    }

    #[test]
    fn test_empty_fragment_with_new_index_closes_call() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("a"), None));
        agg.submit(&frag(Some(1), None, None));
        assert_eq!(agg.finalized().len(), 1);
        assert_eq!(agg.finalized()[0].name, "a");
        assert!(!agg.has_pending());

        agg.submit(&frag(Some(1), None, Some("{}")));
        let calls = agg.finish();
        assert_eq!(calls.len(), 2);
        assert!(calls[1].name.is_empty());
        assert_eq!(calls[1].args, "{}");
    }

    #[test]
    fn test_empty_fragment_with_same_index_changes_nothing() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("a"), Some("{")));
        agg.submit(&frag(Some(0), None, None));
        agg.submit(&frag(Some(0), None, Some("}")));
        let calls = agg.finish();
        assert_eq!(calls.len(), 1);
        assert_eq!((calls[0].name.as_str(), calls[0].args.as_str()), ("a", "{}"));
    }

    #[test]
    fn test_first_id_is_kept() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&ToolCallFragment {
            index: Some(0),
            id: Some("call_1".to_string()),
            name: Some("get".to_string()),
            arguments_chunk: None,
        });
        agg.submit(&ToolCallFragment {
            index: Some(0),
            id: Some("call_other".to_string()),
            name: None,
            arguments_chunk: Some("{}".to_string()),
        });
        let calls = agg.finish();
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_drain_leaves_pending_call() {
        let mut agg = ToolCallAggregator::new();
        agg.submit(&frag(Some(0), Some("a"), Some("{}")));
        agg.submit(&frag(Some(1), Some("b"), None));
        assert_eq!(agg.drain().len(), 1);
        assert!(agg.finalized().is_empty());
        assert!(agg.has_pending());
        assert_eq!(agg.finish()[0].name, "b");
    }

    #[test]
    fn test_finish_on_fresh_aggregator_is_empty() {
        let mut agg = ToolCallAggregator::new();
        assert!(agg.finish().is_empty());
    }
}
