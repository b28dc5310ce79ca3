//! Agent runtime event protocol types.
//!
//! The hosted research agent emits a JSON-per-frame event stream. Frames are
//! discriminated by a `type` field; payloads are loosely typed, so anything
//! the gateway does not interpret structurally stays a `serde_json::Value`.
//! Unknown frame and sub-event types decode to `Unknown` instead of failing
//! the stream.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// Top-level events
// ============================================================================

/// One frame of the agent event stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Full snapshot of the in-progress assistant message.
    Assistant { message: MessagePayload },
    /// Tool results echoed back on the user side of the conversation.
    User { message: MessagePayload },
    /// Incremental streaming event wrapping an inner typed event.
    StreamEvent {
        event: StreamEvent,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
    },
    /// Runtime lifecycle notice (session init and friends).
    System {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tools: Option<Vec<String>>,
    },
    /// Terminal accounting frame for a completed query.
    Result {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        subtype: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total_cost_usd: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    #[serde(other)]
    Unknown,
}

impl AgentEvent {
    /// Parse a single JSON frame from the stream.
    pub fn parse(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Short label used in stream lifecycle logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Assistant { .. } => "assistant",
            Self::User { .. } => "user",
            Self::StreamEvent { .. } => "stream_event",
            Self::System { .. } => "system",
            Self::Result { .. } => "result",
            Self::Unknown => "unknown",
        }
    }
}

/// Message body carried by snapshot and tool-result frames.
///
/// `content` stays loosely typed: snapshots carry a block array, tool-result
/// echoes carry either a string or a list of `tool_result` items.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Token accounting as reported by the runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_creation_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_tier: Option<String>,
}

// ============================================================================
// Streaming events
// ============================================================================

/// Inner event of a `stream_event` frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Message metadata becomes available.
    MessageStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<MessagePayload>,
    },
    /// A new content block opens at `index`.
    ContentBlockStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content_block: Option<Value>,
    },
    /// An incremental fragment for the block at `index`.
    ContentBlockDelta {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        delta: Option<Delta>,
    },
    /// The block at `index` is finalized.
    ContentBlockStop {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Stop-reason/usage bookkeeping; carries no block content.
    MessageDelta,
    #[serde(other)]
    Unknown,
}

/// One fragment of block content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

impl Delta {
    /// The textual fragment for text-kind deltas (`text_delta` and
    /// `thinking_delta`); `None` for JSON and signature fragments.
    pub fn text_fragment(&self) -> Option<&str> {
        match self {
            Self::TextDelta { text } => Some(text),
            Self::ThinkingDelta { thinking } => Some(thinking),
            _ => None,
        }
    }
}

/// Declared shape of a `content_block_start` payload.
///
/// The payload is delivered untyped; this is the interpreted view the
/// normalizer works from.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockStart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thinking: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl BlockStart {
    /// Interpret a raw `content_block` value. Returns `None` when the payload
    /// is not an object with a string `type`.
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_stream_event_text_delta() {
        let frame = r#"{"type":"stream_event","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}}"#;
        let event = AgentEvent::parse(frame).unwrap();
        match event {
            AgentEvent::StreamEvent {
                event:
                    StreamEvent::ContentBlockDelta {
                        index: Some(0),
                        delta: Some(Delta::TextDelta { text }),
                    },
                ..
            } => assert_eq!(text, "Hel"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_parse_assistant_snapshot() {
        let frame = r#"{"type":"assistant","message":{"id":"msg_abc","model":"sonnet","content":[{"type":"text","text":"hi"}]}}"#;
        let event = AgentEvent::parse(frame).unwrap();
        match event {
            AgentEvent::Assistant { message } => {
                assert_eq!(message.id.as_deref(), Some("msg_abc"));
                assert!(message.content.is_array());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_event_type_does_not_fail() {
        let event = AgentEvent::parse(r#"{"type":"telemetry","data":{}}"#).unwrap();
        assert!(matches!(event, AgentEvent::Unknown));

        let frame = r#"{"type":"stream_event","event":{"type":"ping"}}"#;
        match AgentEvent::parse(frame).unwrap() {
            AgentEvent::StreamEvent { event, .. } => {
                assert!(matches!(event, StreamEvent::Unknown));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_block_start_interpretation() {
        let value = json!({"type": "tool_use", "id": "tu_1", "name": "Write"});
        let block = BlockStart::from_value(&value).unwrap();
        assert_eq!(block.kind, "tool_use");
        assert_eq!(block.name.as_deref(), Some("Write"));

        assert!(BlockStart::from_value(&json!("text")).is_none());
    }

    #[test]
    fn test_delta_text_fragment() {
        let delta = Delta::ThinkingDelta {
            thinking: "mull".to_string(),
        };
        assert_eq!(delta.text_fragment(), Some("mull"));
        let delta = Delta::InputJsonDelta {
            partial_json: "{\"a\":".to_string(),
        };
        assert_eq!(delta.text_fragment(), None);
    }
}
