//! WebSocket handler for chat client connections.

use std::time::Duration;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::api::AppState;
use crate::chat::{Conversation, TranscriptChange};
use crate::transport::TransportEvent;

use super::types::{ClientFrame, ServerFrame};

/// Ping interval for keepalive.
const PING_INTERVAL_SECS: u64 = 30;

/// Buffer for events flowing from the transport task into the connection
/// loop.
const TURN_EVENT_BUFFER: usize = 64;

/// WebSocket upgrade handler.
///
/// GET /api/ws
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

/// One chat client connection: owns the conversation, drives the upstream
/// transport for each turn, and pushes both raw events and transcript
/// deltas downstream. All conversation mutation happens on this task.
async fn handle_connection(socket: WebSocket, state: AppState) {
    let conn_id = state.hub.register();
    let (mut sender, mut receiver) = socket.split();

    if send_frame(&mut sender, &ServerFrame::Connected).await.is_err() {
        state.hub.unregister(conn_id);
        return;
    }

    let mut conversation = Conversation::new();
    let (turn_tx, mut turn_rx) = mpsc::channel::<(u64, TransportEvent)>(TURN_EVENT_BUFFER);
    // (generation, assistant message id) of the in-flight turn.
    let mut active_turn: Option<(u64, String)> = None;

    let mut ping = tokio::time::interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping.tick().await; // first tick resolves immediately

    loop {
        tokio::select! {
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ClientFrame>(&text) {
                            Ok(ClientFrame::Chat { content }) => {
                                if let Err(e) = start_turn(
                                    &state,
                                    &mut conversation,
                                    &mut sender,
                                    &turn_tx,
                                    &mut active_turn,
                                    &content,
                                )
                                .await
                                {
                                    debug!("connection {conn_id} send failed: {e}");
                                    break;
                                }
                            }
                            Ok(ClientFrame::Pong) => {}
                            Err(e) => {
                                warn!("unparseable client frame on connection {conn_id}: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("connection {conn_id} closed by client");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary and control frames carry no commands.
                    }
                    Some(Err(e)) => {
                        warn!("socket error on connection {conn_id}: {e}");
                        break;
                    }
                }
            }

            Some((generation, event)) = turn_rx.recv() => {
                if handle_turn_event(
                    &mut conversation,
                    &mut sender,
                    &mut active_turn,
                    generation,
                    event,
                )
                .await
                .is_err()
                {
                    break;
                }
            }

            _ = ping.tick() => {
                if send_frame(&mut sender, &ServerFrame::Ping).await.is_err() {
                    break;
                }
            }
        }
    }

    state.hub.unregister(conn_id);
    info!("connection {conn_id} finished");
}

/// Begin a turn: append the prompt and the fresh assistant message, announce
/// the stream, and hand the prompt to the transport on its own task.
async fn start_turn(
    state: &AppState,
    conversation: &mut Conversation,
    sender: &mut SplitSink<WebSocket, Message>,
    turn_tx: &mpsc::Sender<(u64, TransportEvent)>,
    active_turn: &mut Option<(u64, String)>,
    prompt: &str,
) -> Result<(), axum::Error> {
    if active_turn.is_some() {
        return send_frame(
            sender,
            &ServerFrame::Error {
                error: "a turn is already in progress".to_string(),
            },
        )
        .await;
    }

    let (generation, changes) = conversation.begin_turn(prompt);
    let message_id = conversation
        .messages()
        .last()
        .map(|m| m.id().to_string())
        .unwrap_or_default();

    send_changes(conversation, sender, &changes).await?;
    send_frame(
        sender,
        &ServerFrame::StreamStart {
            message_id: message_id.clone(),
        },
    )
    .await?;

    *active_turn = Some((generation, message_id));

    // The transport reports through an inner channel; a forwarder tags each
    // event with the turn's generation so stale turns drop out naturally.
    let (inner_tx, mut inner_rx) = mpsc::channel::<TransportEvent>(TURN_EVENT_BUFFER);
    let forward_tx = turn_tx.clone();
    tokio::spawn(async move {
        while let Some(event) = inner_rx.recv().await {
            if forward_tx.send((generation, event)).await.is_err() {
                break;
            }
        }
    });

    let transport = state.transport.clone();
    let prompt = prompt.to_string();
    tokio::spawn(async move {
        if let Err(e) = transport.run_turn(&prompt, inner_tx.clone()).await {
            let _ = inner_tx.send(TransportEvent::Failed(e.to_string())).await;
        }
    });

    Ok(())
}

/// Apply one transport event to the conversation and relay the results.
async fn handle_turn_event(
    conversation: &mut Conversation,
    sender: &mut SplitSink<WebSocket, Message>,
    active_turn: &mut Option<(u64, String)>,
    generation: u64,
    event: TransportEvent,
) -> Result<(), axum::Error> {
    let message_id = match active_turn {
        Some((turn_generation, message_id)) if *turn_generation == generation => {
            message_id.clone()
        }
        _ => {
            debug!("dropping event for inactive turn generation {generation}");
            return Ok(());
        }
    };

    match event {
        TransportEvent::Started { message_id: upstream_id } => {
            debug!(
                "turn {generation} streaming (upstream id {})",
                upstream_id.as_deref().unwrap_or("-")
            );
        }
        TransportEvent::Event(agent_event) => {
            if let Ok(data) = serde_json::to_value(&agent_event) {
                send_frame(
                    sender,
                    &ServerFrame::SdkMessage {
                        message_id: message_id.clone(),
                        data,
                    },
                )
                .await?;
            }
            let changes = conversation.apply(generation, &agent_event);
            send_changes(conversation, sender, &changes).await?;
        }
        TransportEvent::Ended => {
            conversation.finish_turn(generation);
            *active_turn = None;
            send_frame(sender, &ServerFrame::StreamEnd { message_id }).await?;
        }
        TransportEvent::Failed(reason) => {
            let changes = conversation.fail_turn(generation, &reason);
            *active_turn = None;
            send_changes(conversation, sender, &changes).await?;
            send_frame(sender, &ServerFrame::Error { error: reason }).await?;
        }
    }

    Ok(())
}

/// Push transcript deltas for the given changes.
async fn send_changes(
    conversation: &Conversation,
    sender: &mut SplitSink<WebSocket, Message>,
    changes: &[TranscriptChange],
) -> Result<(), axum::Error> {
    for change in changes {
        let frame = match change {
            TranscriptChange::Appended(index) => ServerFrame::MessageAppended {
                message: conversation.messages()[*index].clone(),
            },
            TranscriptChange::Updated(index) => ServerFrame::MessageUpdated {
                index: *index,
                message: conversation.messages()[*index].clone(),
            },
        };
        send_frame(sender, &frame).await?;
    }
    Ok(())
}

async fn send_frame(
    sender: &mut SplitSink<WebSocket, Message>,
    frame: &ServerFrame,
) -> Result<(), axum::Error> {
    let json = match serde_json::to_string(frame) {
        Ok(json) => json,
        Err(e) => {
            warn!("failed to serialize server frame: {e}");
            return Ok(());
        }
    };
    sender.send(Message::Text(json.into())).await
}
