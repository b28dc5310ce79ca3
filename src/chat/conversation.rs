//! Conversation reducer.
//!
//! Owns the ordered transcript and all per-turn state. The transcript is
//! append-only with one exception: while a turn streams, the assistant
//! message appended for that turn is mutated in place at its index, so the
//! UI sees one growing message instead of many.
//!
//! Every turn advances a generation counter. Events are applied against a
//! generation; anything tagged with a stale generation is dropped, which
//! closes the race where a late event from an abandoned turn could land
//! after the next turn has started.

use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info};

use crate::agent::AgentEvent;
use crate::chat::stream::{self, PendingMessage, StreamBuffers};
use crate::chat::types::{
    AssistantMessage, ChatMessage, ContentBlock, ReportMessage, SystemMessage, UserMessage,
};

/// Text of the synthesized assistant message appended on transport failure.
const TRANSPORT_ERROR_TEXT: &str = "Sorry, I encountered an error. Please try again.";

/// How one applied event changed the transcript, by message index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranscriptChange {
    /// A new message was appended at this index.
    Appended(usize),
    /// The message at this index was mutated in place.
    Updated(usize),
}

/// Per-turn state: the streaming assistant message's index, its accumulation
/// buffers, and the report halt latch.
#[derive(Debug)]
struct TurnState {
    index: usize,
    buffers: StreamBuffers,
    halted: bool,
    started: Instant,
}

/// The canonical conversation: ordered messages plus the in-flight turn.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    counter: u64,
    generation: u64,
    turn: Option<TurnState>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic per-conversation message ids, in generation order.
    fn next_id(&mut self) -> String {
        self.counter += 1;
        format!("msg_{}", self.counter)
    }

    /// The current turn generation. Events must be applied with the
    /// generation returned by the `begin_turn` that started their turn.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_streaming(&self) -> bool {
        self.turn.is_some()
    }

    /// The most recently detected report, if any.
    pub fn latest_report(&self) -> Option<&ReportMessage> {
        self.messages.iter().rev().find_map(|msg| match msg {
            ChatMessage::Report(report) => Some(report),
            _ => None,
        })
    }

    /// Start a new turn: appends the user prompt and a fresh assistant
    /// message, resets buffers and the report latch, and invalidates any
    /// in-flight turn by advancing the generation.
    pub fn begin_turn(&mut self, prompt: &str) -> (u64, Vec<TranscriptChange>) {
        self.generation += 1;

        let user_id = self.next_id();
        self.messages.push(ChatMessage::User(UserMessage {
            id: user_id,
            timestamp: Utc::now(),
            content: prompt.to_string(),
        }));
        let user_index = self.messages.len() - 1;

        let assistant_id = self.next_id();
        self.messages.push(ChatMessage::Assistant(AssistantMessage::new(
            assistant_id,
            Utc::now(),
        )));
        let assistant_index = self.messages.len() - 1;

        self.turn = Some(TurnState {
            index: assistant_index,
            buffers: StreamBuffers::new(),
            halted: false,
            started: Instant::now(),
        });

        (
            self.generation,
            vec![
                TranscriptChange::Appended(user_index),
                TranscriptChange::Appended(assistant_index),
            ],
        )
    }

    /// Apply one agent event to the in-flight turn.
    ///
    /// Stale generations, finished turns, and halted turns are all no-ops.
    pub fn apply(&mut self, generation: u64, event: &AgentEvent) -> Vec<TranscriptChange> {
        if generation != self.generation {
            debug!(generation, current = self.generation, "dropping stale event");
            return Vec::new();
        }
        let Some(turn) = &mut self.turn else {
            return Vec::new();
        };
        if turn.halted {
            return Vec::new();
        }

        let index = turn.index;
        let pending = {
            let Some(assistant) = self.messages[index].as_assistant_mut() else {
                return Vec::new();
            };
            stream::apply_event(event, assistant, &mut turn.buffers)
        };

        let mut changes = vec![TranscriptChange::Updated(index)];
        let mut report_detected = false;
        for message in pending {
            let id = self.next_id();
            let timestamp = Utc::now();
            match message {
                PendingMessage::ToolResult(content) => {
                    self.messages.push(ChatMessage::User(UserMessage {
                        id,
                        timestamp,
                        content,
                    }));
                }
                PendingMessage::SessionNote(content) => {
                    self.messages.push(ChatMessage::System(SystemMessage {
                        id,
                        timestamp,
                        content,
                    }));
                }
                PendingMessage::Report(artifact) => {
                    self.messages.push(ChatMessage::Report(ReportMessage {
                        id,
                        timestamp,
                        artifact,
                    }));
                    report_detected = true;
                }
            }
            changes.push(TranscriptChange::Appended(self.messages.len() - 1));
        }

        if report_detected {
            if let Some(turn) = &mut self.turn {
                turn.halted = true;
            }
            info!("report detected, suppressing further updates this turn");
        }

        changes
    }

    /// Close the in-flight turn on the stream's terminal marker.
    pub fn finish_turn(&mut self, generation: u64) {
        if generation != self.generation {
            return;
        }
        if let Some(turn) = self.turn.take() {
            info!(elapsed_ms = turn.started.elapsed().as_millis() as u64, "turn finished");
        }
    }

    /// Abort the in-flight turn on transport failure, surfacing a
    /// synthesized assistant error message.
    pub fn fail_turn(&mut self, generation: u64, reason: &str) -> Vec<TranscriptChange> {
        if generation != self.generation {
            return Vec::new();
        }
        let Some(turn) = self.turn.take() else {
            return Vec::new();
        };
        debug!(elapsed_ms = turn.started.elapsed().as_millis() as u64, reason, "turn failed");

        let id = self.next_id();
        let mut error_message = AssistantMessage::new(id, Utc::now());
        error_message.content.push(ContentBlock::Text {
            text: TRANSPORT_ERROR_TEXT.to_string(),
        });
        self.messages.push(ChatMessage::Assistant(error_message));
        vec![TranscriptChange::Appended(self.messages.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{Delta, MessagePayload, StreamEvent};
    use crate::chat::types::ContentBlock;
    use serde_json::json;

    fn stream_event(event: StreamEvent) -> AgentEvent {
        AgentEvent::StreamEvent {
            event,
            session_id: None,
        }
    }

    fn report_write_input() -> serde_json::Value {
        json!({
            "file_path": "logs/acme-analysis.md",
            "content": "---\ncompany: Acme\nurl: https://acme.io\nindustry: SaaS\nlocation: NYC\nsize: 50\nanalyzed: 2024-01-01\n---\n\nBody\n",
        })
    }

    #[test]
    fn test_turn_appends_user_and_assistant() {
        let mut conversation = Conversation::new();
        let (generation, changes) = conversation.begin_turn("analyze acme.io");

        assert_eq!(generation, 1);
        assert_eq!(
            changes,
            vec![TranscriptChange::Appended(0), TranscriptChange::Appended(1)]
        );
        assert!(matches!(&conversation.messages()[0], ChatMessage::User(m) if m.content == "analyze acme.io"));
        assert!(matches!(&conversation.messages()[1], ChatMessage::Assistant(_)));
        assert!(conversation.is_streaming());
    }

    #[test]
    fn test_streaming_mutates_assistant_in_place() {
        let mut conversation = Conversation::new();
        let (generation, _) = conversation.begin_turn("hi");

        conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "text", "text": ""})),
            }),
        );
        let changes = conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockDelta {
                index: Some(0),
                delta: Some(Delta::TextDelta {
                    text: "Hello".to_string(),
                }),
            }),
        );

        assert_eq!(changes, vec![TranscriptChange::Updated(1)]);
        assert_eq!(conversation.messages().len(), 2);
        match &conversation.messages()[1] {
            ChatMessage::Assistant(m) => {
                assert!(matches!(&m.content[0], ContentBlock::Text { text } if text == "Hello"));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_stale_generation_events_are_dropped() {
        let mut conversation = Conversation::new();
        let (old_generation, _) = conversation.begin_turn("first");
        let (_, _) = conversation.begin_turn("second");

        let changes = conversation.apply(
            old_generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "text", "text": "stale"})),
            }),
        );

        assert!(changes.is_empty());
        match conversation.messages().last().unwrap() {
            ChatMessage::Assistant(m) => assert!(m.content.is_empty()),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_report_halts_further_updates() {
        let mut conversation = Conversation::new();
        let (generation, _) = conversation.begin_turn("analyze");

        conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "tool_use", "id": "tu_1", "name": "Write"})),
            }),
        );
        conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockDelta {
                index: Some(0),
                delta: Some(Delta::InputJsonDelta {
                    partial_json: report_write_input().to_string(),
                }),
            }),
        );

        // Tool result arrives: echo + report are appended.
        let changes = conversation.apply(
            generation,
            &AgentEvent::User {
                message: MessagePayload {
                    content: json!([{"type": "tool_result", "content": "ok"}]),
                    ..Default::default()
                },
            },
        );
        assert_eq!(changes.len(), 3);
        assert!(conversation.latest_report().is_some());

        // Later events for the same turn are suppressed by the latch.
        let changes = conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(1),
                content_block: Some(json!({"type": "text", "text": "more"})),
            }),
        );
        assert!(changes.is_empty());
    }

    #[test]
    fn test_new_turn_resets_latch() {
        let mut conversation = Conversation::new();
        let (generation, _) = conversation.begin_turn("analyze");
        conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "tool_use", "id": "tu_1", "name": "Write"})),
            }),
        );
        conversation.apply(
            generation,
            &stream_event(StreamEvent::ContentBlockDelta {
                index: Some(0),
                delta: Some(Delta::InputJsonDelta {
                    partial_json: report_write_input().to_string(),
                }),
            }),
        );
        conversation.apply(
            generation,
            &AgentEvent::User {
                message: MessagePayload {
                    content: json!("done"),
                    ..Default::default()
                },
            },
        );

        let (next_generation, _) = conversation.begin_turn("again");
        let changes = conversation.apply(
            next_generation,
            &stream_event(StreamEvent::ContentBlockStart {
                index: Some(0),
                content_block: Some(json!({"type": "text", "text": "fresh"})),
            }),
        );
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_fail_turn_appends_error_message() {
        let mut conversation = Conversation::new();
        let (generation, _) = conversation.begin_turn("hi");

        let changes = conversation.fail_turn(generation, "connection reset");
        assert_eq!(changes.len(), 1);
        assert!(!conversation.is_streaming());
        match conversation.messages().last().unwrap() {
            ChatMessage::Assistant(m) => {
                assert!(
                    matches!(&m.content[0], ContentBlock::Text { text } if text == TRANSPORT_ERROR_TEXT)
                );
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_finish_turn_clears_streaming_state() {
        let mut conversation = Conversation::new();
        let (generation, _) = conversation.begin_turn("hi");
        conversation.finish_turn(generation);
        assert!(!conversation.is_streaming());

        // Finishing a stale generation is a no-op.
        let (generation, _) = conversation.begin_turn("again");
        conversation.finish_turn(generation - 1);
        assert!(conversation.is_streaming());
    }

    #[test]
    fn test_message_ids_are_sequential() {
        let mut conversation = Conversation::new();
        conversation.begin_turn("one");
        conversation.begin_turn("two");

        let ids: Vec<&str> = conversation.messages().iter().map(ChatMessage::id).collect();
        assert_eq!(ids, vec!["msg_1", "msg_2", "msg_3", "msg_4"]);
    }
}
