//! WebSocket transport to the agent's stream relay.
//!
//! Frames are JSON envelopes: `stream_start` / `sdk_message` / `stream_end`
//! / `error`, with the raw agent event carried in `sdk_message.data`. A turn
//! starts by sending `{type: "chat", content}`.
//!
//! Connections are established per turn with a bounded, fixed-delay retry.
//! A connection dropped mid-turn is not replayed: the turn ends quietly and
//! whatever streamed so far stands (at-least-once, best-effort).

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use super::{AgentTransport, TransportError, TransportEvent};
use crate::agent::AgentEvent;

/// Fixed delay between connection attempts.
const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Connection attempts per turn before giving up.
const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Envelope frames received from the relay.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayFrame {
    StreamStart {
        #[serde(rename = "messageId", default)]
        message_id: Option<String>,
    },
    SdkMessage {
        #[serde(rename = "messageId", default)]
        #[allow(dead_code)]
        message_id: Option<String>,
        data: Value,
    },
    StreamEnd {
        #[serde(rename = "messageId", default)]
        #[allow(dead_code)]
        message_id: Option<String>,
    },
    Error {
        #[serde(default)]
        error: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Commands sent to the relay.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum RelayCommand {
    Chat { content: String },
}

pub struct SocketTransport {
    url: String,
}

impl SocketTransport {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
        }
    }

    async fn connect(
        &self,
    ) -> Result<
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        TransportError,
    > {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match connect_async(self.url.as_str()).await {
                Ok((stream, _)) => {
                    info!("connected to agent relay at {}", self.url);
                    return Ok(stream);
                }
                Err(e) if attempt < MAX_CONNECT_ATTEMPTS => {
                    warn!(
                        "relay connection attempt {}/{} failed: {}, retrying in {:?}",
                        attempt, MAX_CONNECT_ATTEMPTS, e, RECONNECT_DELAY
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                }
                Err(e) => {
                    return Err(TransportError::Connect(e.to_string()));
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl AgentTransport for SocketTransport {
    async fn run_turn(
        &self,
        prompt: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let stream = self.connect().await?;
        let (mut sink, mut frames) = stream.split();

        let command = RelayCommand::Chat {
            content: prompt.to_string(),
        };
        let payload =
            serde_json::to_string(&command).map_err(|e| TransportError::Request(e.to_string()))?;
        sink.send(Message::text(payload))
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        while let Some(frame) = frames.next().await {
            let message = match frame {
                Ok(message) => message,
                Err(e) => {
                    // Dropped mid-turn: leave the partial message as-is and
                    // end the turn without surfacing an error.
                    warn!("relay connection lost mid-turn: {}", e);
                    let _ = events.send(TransportEvent::Ended).await;
                    return Ok(());
                }
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => {
                    warn!("relay closed the connection mid-turn");
                    let _ = events.send(TransportEvent::Ended).await;
                    return Ok(());
                }
                // Pings are answered by the websocket layer itself.
                _ => continue,
            };

            let frame = match serde_json::from_str::<RelayFrame>(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("skipping unparseable relay frame: {}", e);
                    continue;
                }
            };

            match frame {
                RelayFrame::StreamStart { message_id } => {
                    if events
                        .send(TransportEvent::Started { message_id })
                        .await
                        .is_err()
                    {
                        return Ok(());
                    }
                }
                RelayFrame::SdkMessage { data, .. } => {
                    match serde_json::from_value::<AgentEvent>(data) {
                        Ok(event) => {
                            debug!("relay event: {}", event.kind());
                            if events.send(TransportEvent::Event(event)).await.is_err() {
                                return Ok(());
                            }
                        }
                        Err(e) => warn!("skipping unparseable agent event: {}", e),
                    }
                }
                RelayFrame::StreamEnd { .. } => {
                    let _ = events.send(TransportEvent::Ended).await;
                    return Ok(());
                }
                RelayFrame::Error { error } => {
                    let reason = error.unwrap_or_else(|| "unknown relay error".to_string());
                    return Err(TransportError::Stream(reason));
                }
                RelayFrame::Unknown => {
                    debug!("ignoring unknown relay frame");
                }
            }
        }

        let _ = events.send(TransportEvent::Ended).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_frame_parsing() {
        let frame: RelayFrame =
            serde_json::from_str(r#"{"type":"stream_start","messageId":"171234"}"#).unwrap();
        assert!(matches!(
            frame,
            RelayFrame::StreamStart { message_id: Some(ref id) } if id == "171234"
        ));

        let frame: RelayFrame = serde_json::from_str(
            r#"{"type":"sdk_message","messageId":"171234","data":{"type":"stream_event","event":{"type":"message_delta"}}}"#,
        )
        .unwrap();
        match frame {
            RelayFrame::SdkMessage { data, .. } => {
                let event: AgentEvent = serde_json::from_value(data).unwrap();
                assert_eq!(event.kind(), "stream_event");
            }
            other => panic!("unexpected frame: {other:?}"),
        }

        let frame: RelayFrame = serde_json::from_str(r#"{"type":"resize"}"#).unwrap();
        assert!(matches!(frame, RelayFrame::Unknown));
    }

    #[test]
    fn test_chat_command_shape() {
        let command = RelayCommand::Chat {
            content: "analyze acme.io".to_string(),
        };
        let json = serde_json::to_string(&command).unwrap();
        assert_eq!(json, r#"{"type":"chat","content":"analyze acme.io"}"#);
    }
}
