//! Event normalizer and streaming accumulation buffers.
//!
//! `apply_event` folds one raw agent event into the in-progress assistant
//! message. It is a pure, synchronous transform over
//! (event, message, buffers); per-turn state lives in the conversation
//! reducer that calls it. Failure states collapse into no-ops — nothing in
//! this module returns an error or panics on malformed input.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::agent::{AgentEvent, BlockStart, Delta, MessagePayload, StreamEvent};
use crate::chat::types::{AssistantMessage, ContentBlock};
use crate::report::{self, ReportArtifact};

/// Per-block accumulation buffers for one streaming assistant message.
///
/// Keyed by the stringified block index. An entry is created on block start,
/// extended on every delta, and dropped on block stop. Buffers are never
/// shared across messages.
#[derive(Debug, Default)]
pub struct StreamBuffers {
    entries: HashMap<String, String>,
}

impl StreamBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an empty buffer for a block index, replacing any stale one.
    pub fn begin(&mut self, index: usize) {
        self.entries.insert(index.to_string(), String::new());
    }

    /// Append a fragment and return the accumulated string.
    pub fn append(&mut self, index: usize, fragment: &str) -> &str {
        let entry = self.entries.entry(index.to_string()).or_default();
        entry.push_str(fragment);
        entry
    }

    /// Drop the buffer for a finalized block.
    pub fn remove(&mut self, index: usize) {
        self.entries.remove(&index.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A message synthesized while normalizing an event. The reducer assigns ids
/// and timestamps when materializing these into the transcript.
#[derive(Debug)]
pub enum PendingMessage {
    /// Human-readable echo of a tool result.
    ToolResult(String),
    /// Runtime lifecycle notice.
    SessionNote(String),
    /// A detected analysis report.
    Report(ReportArtifact),
}

/// Fold one agent event into the streaming assistant message.
///
/// Returns any extra messages to append after the assistant message.
pub fn apply_event(
    event: &AgentEvent,
    message: &mut AssistantMessage,
    buffers: &mut StreamBuffers,
) -> Vec<PendingMessage> {
    match event {
        AgentEvent::Assistant { message: payload } => {
            apply_snapshot(payload, message);
            Vec::new()
        }
        AgentEvent::StreamEvent { event, .. } => {
            apply_stream_event(event, message, buffers);
            Vec::new()
        }
        AgentEvent::User { message: payload } => apply_tool_result(payload, message),
        AgentEvent::System { subtype, model, tools, .. } => {
            if subtype.as_deref() == Some("init") {
                let model = model.as_deref().unwrap_or("unknown model");
                let tools = tools.as_ref().map(Vec::len).unwrap_or(0);
                vec![PendingMessage::SessionNote(format!(
                    "Agent session initialized ({model}, {tools} tools)"
                ))]
            } else {
                debug!(subtype = subtype.as_deref(), "ignoring system event");
                Vec::new()
            }
        }
        AgentEvent::Result { subtype, total_cost_usd, duration_ms } => {
            debug!(
                subtype = subtype.as_deref(),
                cost_usd = total_cost_usd,
                duration_ms,
                "query result received"
            );
            Vec::new()
        }
        AgentEvent::Unknown => {
            warn!("unrecognized agent event type, ignoring");
            Vec::new()
        }
    }
}

/// Replace the message content wholesale from a full snapshot.
fn apply_snapshot(payload: &MessagePayload, message: &mut AssistantMessage) {
    message.merge_identity(payload.id.as_deref(), payload.model.as_deref());
    if let Some(usage) = &payload.usage {
        if let Some(meta) = message.metadata.as_mut() {
            meta.usage = Some(usage.clone());
        }
    }

    let blocks = match &payload.content {
        Value::Array(items) => items.iter().map(transform_block).collect(),
        _ => Vec::new(),
    };
    message.content = blocks;
}

/// Map one snapshot block into the transcript model. Unrecognized block
/// types pass through unchanged.
fn transform_block(value: &Value) -> ContentBlock {
    match value.get("type").and_then(Value::as_str) {
        Some("thinking") => ContentBlock::Thinking {
            text: value
                .get("thinking")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("text") => ContentBlock::Text {
            text: value
                .get("text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        },
        Some("tool_use") => ContentBlock::ToolUse {
            id: value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            name: value
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            input: match value.get("input") {
                Some(input) if !input.is_null() => input.clone(),
                _ => Value::Object(Default::default()),
            },
        },
        other => {
            warn!(block_type = other, "unknown content block type in snapshot");
            ContentBlock::Raw(value.clone())
        }
    }
}

fn apply_stream_event(
    event: &StreamEvent,
    message: &mut AssistantMessage,
    buffers: &mut StreamBuffers,
) {
    match event {
        StreamEvent::MessageStart { message: payload } => {
            if let Some(payload) = payload {
                message.merge_identity(payload.id.as_deref(), payload.model.as_deref());
            }
        }
        StreamEvent::ContentBlockStart { index, content_block } => {
            let Some(raw) = content_block else {
                return;
            };
            let index = index.unwrap_or(0);
            buffers.begin(index);

            match BlockStart::from_value(raw) {
                Some(start) => match start.kind.as_str() {
                    "text" => message.content.push(ContentBlock::Text {
                        text: start.text.unwrap_or_default(),
                    }),
                    "thinking" => message.content.push(ContentBlock::Thinking {
                        text: start.thinking.unwrap_or_default(),
                    }),
                    "tool_use" => message.content.push(ContentBlock::ToolUse {
                        id: start.id.unwrap_or_default(),
                        name: start.name.unwrap_or_default(),
                        input: Value::Object(Default::default()),
                    }),
                    other => {
                        debug!(block_type = other, "ignoring unknown content block sub-type");
                    }
                },
                None => {
                    debug!("unreadable content_block payload, no block appended");
                }
            }
        }
        StreamEvent::ContentBlockDelta { index, delta } => {
            let (Some(index), Some(delta)) = (index, delta) else {
                return;
            };
            apply_delta(*index, delta, message, buffers);
        }
        StreamEvent::ContentBlockStop { index } => {
            if let Some(index) = index {
                buffers.remove(*index);
            }
        }
        StreamEvent::MessageDelta => {}
        StreamEvent::Unknown => {
            debug!("ignoring unrecognized stream event");
        }
    }
}

fn apply_delta(
    index: usize,
    delta: &Delta,
    message: &mut AssistantMessage,
    buffers: &mut StreamBuffers,
) {
    let Some(block) = message.content.get_mut(index) else {
        // Out-of-range deltas should not occur under the stream's ordering
        // guarantee; drop them rather than fault.
        debug!(index, "delta for out-of-range block index, dropping");
        return;
    };

    if let Some(fragment) = delta.text_fragment() {
        if !block.accepts_text_delta() {
            return;
        }
        let accumulated = buffers.append(index, fragment).to_string();
        match block {
            ContentBlock::Text { text } | ContentBlock::Thinking { text } => *text = accumulated,
            _ => {}
        }
        return;
    }

    if let Delta::InputJsonDelta { partial_json } = delta {
        let ContentBlock::ToolUse { input, .. } = block else {
            return;
        };
        let accumulated = buffers.append(index, partial_json);
        // Partial JSON is the expected state mid-stream; keep accumulating
        // until the fragments concatenate into a parseable value.
        if let Ok(parsed) = serde_json::from_str::<Value>(accumulated) {
            *input = parsed;
        }
    }
}

/// Handle a tool-result echo on the user side: synthesize the display
/// message and run report detection against the assistant message that
/// issued the tool call.
fn apply_tool_result(payload: &MessagePayload, message: &AssistantMessage) -> Vec<PendingMessage> {
    let display = display_text(&payload.content);

    let mut pending = vec![PendingMessage::ToolResult(display)];
    if let Some(artifact) = report::detect_report(message) {
        pending.push(PendingMessage::Report(artifact));
    }
    pending
}

/// Flatten tool-result content into a human-readable string: list content
/// yields each `tool_result` item's content field (stringifying
/// non-strings) joined by newline; scalars are stringified directly.
fn display_text(content: &Value) -> String {
    match content {
        Value::Array(items) => items
            .iter()
            .map(|item| {
                let inner = item
                    .get("type")
                    .and_then(Value::as_str)
                    .filter(|t| *t == "tool_result")
                    .and_then(|_| item.get("content"))
                    .filter(|c| !c.is_null() && c.as_str() != Some(""));
                match inner {
                    Some(Value::String(text)) => text.clone(),
                    Some(other) => other.to_string(),
                    None => match item {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    },
                }
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn blank_message() -> AssistantMessage {
        AssistantMessage::new("msg_1", Utc::now())
    }

    fn start_text_block(index: usize) -> AgentEvent {
        AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockStart {
                index: Some(index),
                content_block: Some(json!({"type": "text", "text": ""})),
            },
            session_id: None,
        }
    }

    fn text_delta(index: usize, text: &str) -> AgentEvent {
        AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockDelta {
                index: Some(index),
                delta: Some(Delta::TextDelta {
                    text: text.to_string(),
                }),
            },
            session_id: None,
        }
    }

    fn stop_block(index: usize) -> AgentEvent {
        AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockStop { index: Some(index) },
            session_id: None,
        }
    }

    #[test]
    fn test_text_block_accumulates_across_deltas() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();

        apply_event(&start_text_block(0), &mut message, &mut buffers);
        for chunk in ["Hel", "lo, ", "wor", "ld"] {
            apply_event(&text_delta(0, chunk), &mut message, &mut buffers);
        }
        apply_event(&stop_block(0), &mut message, &mut buffers);

        match &message.content[0] {
            ContentBlock::Text { text } => assert_eq!(text, "Hello, world"),
            other => panic!("unexpected block: {other:?}"),
        }
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_chunking_invariance() {
        let full = "The quick brown fox jumps over the lazy dog";
        let chunkings: [&[usize]; 3] = [&[44], &[1, 10, 33], &[5, 5, 5, 5, 5, 5, 5, 5, 4]];

        let mut finals = Vec::new();
        for sizes in chunkings {
            let mut message = blank_message();
            let mut buffers = StreamBuffers::new();
            apply_event(&start_text_block(0), &mut message, &mut buffers);
            let mut rest = full;
            for size in sizes {
                let (chunk, tail) = rest.split_at(*size);
                rest = tail;
                apply_event(&text_delta(0, chunk), &mut message, &mut buffers);
            }
            apply_event(&stop_block(0), &mut message, &mut buffers);
            match &message.content[0] {
                ContentBlock::Text { text } => finals.push(text.clone()),
                other => panic!("unexpected block: {other:?}"),
            }
        }
        assert!(finals.iter().all(|text| text == full));
    }

    #[test]
    fn test_tool_input_parses_only_at_final_fragment() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();

        let start = AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "tool_use", "id": "tu_1", "name": "Write"})),
            },
            session_id: None,
        };
        apply_event(&start, &mut message, &mut buffers);

        let fragments = ["{\"file_path\":", "\"logs/acme", "-analysis.md\"", "}"];
        for (i, fragment) in fragments.iter().enumerate() {
            let delta = AgentEvent::StreamEvent {
                event: StreamEvent::ContentBlockDelta {
                    index: Some(0),
                    delta: Some(Delta::InputJsonDelta {
                        partial_json: (*fragment).to_string(),
                    }),
                },
                session_id: None,
            };
            apply_event(&delta, &mut message, &mut buffers);

            let ContentBlock::ToolUse { input, .. } = &message.content[0] else {
                panic!("expected tool_use block");
            };
            if i < fragments.len() - 1 {
                assert_eq!(input, &json!({}), "input changed before final fragment");
            } else {
                assert_eq!(input, &json!({"file_path": "logs/acme-analysis.md"}));
            }
        }
    }

    #[test]
    fn test_delta_without_start_is_dropped() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();

        apply_event(&text_delta(3, "orphan"), &mut message, &mut buffers);

        assert!(message.content.is_empty());
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_text_delta_ignored_for_tool_use_block() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();

        let start = AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "tool_use", "id": "tu_1", "name": "Read"})),
            },
            session_id: None,
        };
        apply_event(&start, &mut message, &mut buffers);
        apply_event(&text_delta(0, "stray"), &mut message, &mut buffers);

        let ContentBlock::ToolUse { input, .. } = &message.content[0] else {
            panic!("expected tool_use block");
        };
        assert_eq!(input, &json!({}));
    }

    #[test]
    fn test_unknown_block_subtype_registers_buffer_without_block() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();

        let start = AgentEvent::StreamEvent {
            event: StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "server_tool_use"})),
            },
            session_id: None,
        };
        apply_event(&start, &mut message, &mut buffers);

        assert!(message.content.is_empty());
        assert!(!buffers.is_empty());
    }

    #[test]
    fn test_snapshot_replaces_content_and_merges_metadata() {
        let mut message = blank_message();
        let mut buffers = StreamBuffers::new();
        apply_event(&start_text_block(0), &mut message, &mut buffers);
        apply_event(&text_delta(0, "partial"), &mut message, &mut buffers);

        let snapshot = AgentEvent::Assistant {
            message: MessagePayload {
                id: Some("api_9".to_string()),
                model: Some("sonnet".to_string()),
                content: json!([
                    {"type": "thinking", "thinking": "hmm"},
                    {"type": "text", "text": "done"},
                    {"type": "tool_use", "id": "tu_2", "name": "Read", "input": {"path": "x"}},
                ]),
                usage: None,
            },
        };
        apply_event(&snapshot, &mut message, &mut buffers);

        assert_eq!(message.content.len(), 3);
        assert!(matches!(&message.content[0], ContentBlock::Thinking { text } if text == "hmm"));
        assert!(matches!(&message.content[1], ContentBlock::Text { text } if text == "done"));
        let meta = message.metadata.as_ref().unwrap();
        assert_eq!(meta.id, "api_9");
        assert_eq!(meta.model, "sonnet");
    }

    #[test]
    fn test_tool_result_echo_joins_list_content() {
        let message = blank_message();
        let payload = MessagePayload {
            content: json!([
                {"type": "tool_result", "tool_use_id": "tu_1", "content": "file written"},
                {"type": "tool_result", "tool_use_id": "tu_2", "content": {"lines": 3}},
            ]),
            ..Default::default()
        };

        let pending = apply_tool_result(&payload, &message);
        match &pending[0] {
            PendingMessage::ToolResult(text) => {
                assert_eq!(text, "file written\n{\"lines\":3}");
            }
            other => panic!("unexpected pending message: {other:?}"),
        }
    }

    #[test]
    fn test_scalar_tool_result_is_stringified() {
        assert_eq!(display_text(&json!("plain")), "plain");
        assert_eq!(display_text(&json!(42)), "42");
    }
}
