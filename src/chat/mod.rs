//! Conversation transcript reconstruction.
//!
//! This module owns the canonical transcript model and the streaming
//! pipeline that folds raw agent events into it: `stream` normalizes one
//! event at a time against per-block accumulation buffers, `conversation`
//! holds the ordered message list and per-turn state.

pub mod conversation;
pub mod stream;
pub mod types;

pub use conversation::{Conversation, TranscriptChange};
pub use types::{
    AssistantMessage, ChatMessage, ContentBlock, MessageMetadata, ReportMessage, SystemMessage,
    UserMessage,
};
