//! Canonical transcript message types.
//!
//! Messages are the units the chat UI renders. A transcript is an ordered,
//! append-only list of `ChatMessage`; only the most recently appended
//! assistant message is mutated in place while its turn streams.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::agent::TokenUsage;
use crate::report::ReportArtifact;

/// A transcript message, tagged by role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatMessage {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
    Report(ReportMessage),
}

impl ChatMessage {
    pub fn id(&self) -> &str {
        match self {
            Self::User(m) => &m.id,
            Self::Assistant(m) => &m.id,
            Self::System(m) => &m.id,
            Self::Report(m) => &m.id,
        }
    }

    /// Mutable view of the assistant payload, if this is an assistant
    /// message.
    pub fn as_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match self {
            Self::Assistant(m) => Some(m),
            _ => None,
        }
    }
}

/// A user-submitted prompt or a tool-result echo.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// A runtime lifecycle notice surfaced into the transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
}

/// The streaming assistant message: an ordered list of content blocks plus
/// metadata populated opportunistically from the stream.
///
/// Invariant: block order is append-only and index-stable. A block created
/// at index `i` is never reordered, only mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<MessageMetadata>,
}

impl AssistantMessage {
    pub fn new(id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            timestamp,
            content: Vec::new(),
            metadata: None,
        }
    }

    /// Merge stream-provided identity into the metadata, first-write-wins:
    /// existing non-empty values are preserved when the event lacks them.
    pub fn merge_identity(&mut self, id: Option<&str>, model: Option<&str>) {
        let meta = self.metadata.get_or_insert_with(MessageMetadata::default);
        if meta.id.is_empty() {
            if let Some(id) = id {
                meta.id = id.to_string();
            }
        }
        if meta.model.is_empty() {
            if let Some(model) = model {
                meta.model = model.to_string();
            }
        }
    }

    /// The concatenable text blocks, in order. Used by report summary
    /// extraction.
    pub fn text_blocks(&self) -> impl Iterator<Item = &str> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Stream-level identity and accounting for an assistant message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessageMetadata {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// One unit of assistant output.
///
/// `Raw` carries block types the gateway does not model; they pass through
/// snapshots unchanged so the UI can decide what to do with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(untagged)]
    Raw(Value),
}

impl ContentBlock {
    /// Whether a text-kind delta may be applied to this block.
    pub fn accepts_text_delta(&self) -> bool {
        matches!(self, Self::Text { .. } | Self::Thinking { .. })
    }
}

/// The extracted report artifact, rendered as its own transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMessage {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub artifact: ReportArtifact,
}
