//! Incremental reassembly of JSON messages from a chunked text stream.
//!
//! Chat responses arrive as arbitrarily-split text chunks; discrete JSON
//! messages are delimited by a blank line, which cannot occur inside a
//! payload because inner newlines are escaped. The assembler carries the
//! unterminated tail of each chunk over to the next call.
//!
//! State is scoped to one logical conversation: pushing a chunk for a
//! different conversation id discards any carried-over partial buffer, so a
//! dangling fragment from one chat can never leak into another.

use serde_json::Value;
use serde_json::error::Category;
use tracing::{debug, warn};

/// Separator between two complete messages in the stream.
const MESSAGE_SEPARATOR: &str = "\n\n";

/// Reassembles complete JSON messages from a chunked text stream.
///
/// One instance per active response stream; call [`ChunkAssembler::clear`]
/// when a stream is aborted so a later stream starts from empty state.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    /// Accumulated text not yet confirmed as a complete message
    buffer: String,
    /// Conversation the buffered text belongs to
    conversation_id: Option<String>,
}

impl ChunkAssembler {
    /// Create an assembler with empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw chunk and return the messages it completed.
    ///
    /// Returns only the messages completed by this call, in stream order.
    /// The final segment of the split is always retained as the carry-over
    /// buffer, even when it happens to parse as valid JSON: a segment is only
    /// confirmed complete once a following separator arrives, and many short
    /// messages would otherwise be emitted twice.
    pub fn push_chunk(&mut self, chunk: &str, conversation_id: &str) -> Vec<Value> {
        if self.conversation_id.as_deref() != Some(conversation_id) {
            if !self.buffer.is_empty() {
                debug!(
                    "discarding {} buffered bytes from previous conversation",
                    self.buffer.len()
                );
            }
            self.buffer.clear();
            self.conversation_id = Some(conversation_id.to_string());
        }

        self.buffer.push_str(chunk);

        let segments: Vec<String> = self
            .buffer
            .split(MESSAGE_SEPARATOR)
            .map(str::to_owned)
            .collect();
        let last = segments.len() - 1;

        let mut messages = Vec::new();
        for segment in &segments[..last] {
            let segment = segment.trim();
            if segment.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(segment) {
                Ok(value) => messages.push(value),
                // Incomplete data from the split, not corruption
                Err(e) if matches!(e.classify(), Category::Syntax | Category::Eof) => {
                    debug!("dropping unparseable stream segment: {}", e);
                }
                Err(e) => {
                    warn!("dropping undecodable stream segment: {}", e);
                }
            }
        }

        // Leading whitespace is insignificant; the tail must keep any
        // trailing newline so a separator split across chunks still forms.
        self.buffer = segments[last].trim_start().to_string();

        messages
    }

    /// Reset the carry-over buffer and conversation id unconditionally.
    ///
    /// Must be called when a stream is aborted, e.g. on cancellation.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.conversation_id = None;
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_chunk_fresh_state() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push_chunk("", "chat-1").is_empty());
    }

    #[test]
    fn test_single_complete_message() {
        let mut assembler = ChunkAssembler::new();
        let out = assembler.push_chunk("{\"a\":1}\n\n", "chat-1");
        assert_eq!(out, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_trailing_segment_held_back_until_confirmed() {
        let mut assembler = ChunkAssembler::new();
        // Parses as valid JSON but is not yet terminated by a separator
        let out = assembler.push_chunk("{\"a\":1}", "chat-1");
        assert!(out.is_empty());

        let out = assembler.push_chunk("\n\n", "chat-1");
        assert_eq!(out, vec![json!({"a": 1})]);
    }

    #[test]
    fn test_message_split_across_calls() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push_chunk("{\"text\":\"hel", "chat-1").is_empty());
        let out = assembler.push_chunk("lo\"}\n\n", "chat-1");
        assert_eq!(out, vec![json!({"text": "hello"})]);
    }

    #[test]
    fn test_one_char_at_a_time() {
        let stream = "{\"a\":1}\n\n{\"b\":2}\n\n{\"c\":3}\n\n";
        let mut assembler = ChunkAssembler::new();
        let mut all = Vec::new();
        for ch in stream.chars() {
            all.extend(assembler.push_chunk(&ch.to_string(), "chat-1"));
        }
        assert_eq!(all, vec![json!({"a": 1}), json!({"b": 2}), json!({"c": 3})]);
    }

    #[test]
    fn test_multiple_messages_in_one_chunk() {
        let mut assembler = ChunkAssembler::new();
        let out = assembler.push_chunk("{\"a\":1}\n\n{\"b\":2}\n\n{\"c\":3}", "chat-1");
        assert_eq!(out, vec![json!({"a": 1}), json!({"b": 2})]);
        // Tail is still buffered
        let out = assembler.push_chunk("\n\n", "chat-1");
        assert_eq!(out, vec![json!({"c": 3})]);
    }

    #[test]
    fn test_conversation_switch_discards_buffer() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push_chunk("{\"partial\":", "chat-a").is_empty());

        // Fragment from chat-a must not leak into chat-b
        let out = assembler.push_chunk("{\"b\":2}\n\n", "chat-b");
        assert_eq!(out, vec![json!({"b": 2})]);
    }

    #[test]
    fn test_invalid_completed_segment_dropped_silently() {
        let mut assembler = ChunkAssembler::new();
        let out = assembler.push_chunk("not json\n\n{\"ok\":true}\n\n", "chat-1");
        assert_eq!(out, vec![json!({"ok": true})]);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut assembler = ChunkAssembler::new();
        assert!(assembler.push_chunk("{\"partial\":", "chat-1").is_empty());
        assembler.clear();

        // Same conversation id, but the aborted fragment is gone
        let out = assembler.push_chunk("{\"x\":9}\n\n", "chat-1");
        assert_eq!(out, vec![json!({"x": 9})]);
    }

    #[test]
    fn test_arbitrary_splits_yield_same_messages() {
        let stream = "{\"a\":1}\n\n{\"b\":\"two\"}\n\n{\"c\":[3,3,3]}\n\n";
        for split_at in 1..stream.len() {
            let mut assembler = ChunkAssembler::new();
            let mut all = Vec::new();
            all.extend(assembler.push_chunk(&stream[..split_at], "chat-1"));
            all.extend(assembler.push_chunk(&stream[split_at..], "chat-1"));
            assert_eq!(
                all,
                vec![json!({"a": 1}), json!({"b": "two"}), json!({"c": [3, 3, 3]})],
                "split at {split_at}"
            );
        }
    }
}
