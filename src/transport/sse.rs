//! SSE transport: one HTTP request per turn.
//!
//! The agent's HTTP API takes the prompt as a JSON POST and answers with a
//! `data: <json>` line stream terminated by a literal `data: [DONE]`.

use futures::StreamExt;
use log::{debug, warn};
use reqwest_eventsource::{Event, EventSource};
use serde_json::json;
use tokio::sync::mpsc;

use super::{AgentTransport, TransportError, TransportEvent};
use crate::agent::AgentEvent;

/// Terminal marker closing the event stream.
const DONE_MARKER: &str = "[DONE]";

pub struct SseTransport {
    endpoint: String,
    client: reqwest::Client,
}

impl SseTransport {
    pub fn new(base_url: &str) -> Self {
        Self {
            endpoint: format!("{}/api/claude", base_url.trim_end_matches('/')),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait::async_trait]
impl AgentTransport for SseTransport {
    async fn run_turn(
        &self,
        prompt: &str,
        events: mpsc::Sender<TransportEvent>,
    ) -> Result<(), TransportError> {
        let request = self
            .client
            .post(&self.endpoint)
            .json(&json!({ "message": prompt }));

        let mut source =
            EventSource::new(request).map_err(|e| TransportError::Request(e.to_string()))?;

        if events
            .send(TransportEvent::Started { message_id: None })
            .await
            .is_err()
        {
            return Ok(());
        }

        while let Some(item) = source.next().await {
            match item {
                Ok(Event::Open) => {
                    debug!("sse stream opened: {}", self.endpoint);
                }
                Ok(Event::Message(message)) => {
                    if message.data == DONE_MARKER {
                        source.close();
                        let _ = events.send(TransportEvent::Ended).await;
                        return Ok(());
                    }
                    match AgentEvent::parse(&message.data) {
                        Ok(event) => {
                            debug!("sse event: {}", event.kind());
                            if events.send(TransportEvent::Event(event)).await.is_err() {
                                source.close();
                                return Ok(());
                            }
                        }
                        Err(e) => {
                            warn!("skipping unparseable sse frame: {}", e);
                        }
                    }
                }
                Err(reqwest_eventsource::Error::StreamEnded) => {
                    // Upstream closed without the DONE marker; treat the turn
                    // as complete rather than failed.
                    let _ = events.send(TransportEvent::Ended).await;
                    return Ok(());
                }
                Err(e) => {
                    source.close();
                    return Err(TransportError::Stream(e.to_string()));
                }
            }
        }

        let _ = events.send(TransportEvent::Ended).await;
        Ok(())
    }
}
