//! WebSocket frame types for the browser-facing relay.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chat::ChatMessage;

/// Frames sent to the chat client.
///
/// The stream envelope (`stream_start` / `sdk_message` / `stream_end` /
/// `error`) mirrors the agent relay protocol so clients that already speak
/// it can consume raw events; `message_appended` / `message_updated` carry
/// the reduced transcript for clients that just render.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection established.
    Connected,

    /// Heartbeat/keepalive ping.
    Ping,

    /// A turn began streaming.
    StreamStart {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// One raw agent event, as received from the upstream transport.
    SdkMessage {
        #[serde(rename = "messageId")]
        message_id: String,
        data: Value,
    },

    /// The turn's stream completed.
    StreamEnd {
        #[serde(rename = "messageId")]
        message_id: String,
    },

    /// A new transcript message was appended.
    MessageAppended { message: ChatMessage },

    /// The transcript message at `index` was mutated in place.
    MessageUpdated { index: usize, message: ChatMessage },

    /// Error message.
    Error { error: String },
}

/// Frames received from the chat client.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start a conversation turn.
    Chat { content: String },
    /// Pong response to ping.
    Pong,
}
