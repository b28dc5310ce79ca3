//! Dealscope gateway library.
//!
//! This library provides the core components for the dealscope chat gateway:
//! the agent event model, the streaming transcript reconstruction pipeline,
//! the report extractor, the upstream transport adapters, and the HTTP/WS
//! surfaces consumed by the chat UI.

pub mod agent;
pub mod api;
pub mod chat;
pub mod markdown;
pub mod report;
pub mod transport;
pub mod ws;
