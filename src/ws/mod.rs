//! Browser-facing WebSocket relay.
//!
//! Each connection owns one conversation and drives the upstream transport
//! for it: inbound `chat` frames start turns, raw agent events are relayed
//! downstream as `sdk_message` envelopes, and the reduced transcript deltas
//! are pushed alongside so thin clients can render without reimplementing
//! reconstruction.

mod handler;
mod hub;
mod types;

pub use handler::ws_handler;
pub use hub::WsHub;
pub use types::{ClientFrame, ServerFrame};
