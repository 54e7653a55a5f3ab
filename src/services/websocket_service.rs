//! Bidirectional relay between a browser WebSocket and a room topic.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::RoomMessage,
    engine::PlayerNumber,
    error::ServiceError,
    state::SharedState,
};

/// Why an inbound frame was not relayed.
#[derive(Debug, Error)]
enum RelayError {
    /// The frame is not a room message.
    #[error("malformed room message: {0}")]
    Malformed(#[from] serde_json::Error),
    /// The message speaks for another seat.
    #[error("seat {seat} cannot publish on behalf of player {claimed}")]
    Impersonation {
        seat: PlayerNumber,
        claimed: PlayerNumber,
    },
}

/// Resolve the seat of `user_id` in `room`, refusing strangers.
pub async fn authorize(
    state: &SharedState,
    room: Uuid,
    user_id: &str,
) -> Result<PlayerNumber, ServiceError> {
    let store = state.require_room_store().await?;
    let room = store
        .get(room)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {room}")))?;
    room.participant(user_id)
        .map(|participant| participant.player)
        .ok_or_else(|| ServiceError::InvalidState(format!("`{user_id}` holds no seat")))
}

/// Relay frames between `socket` and the topic of `room` until either side closes.
pub async fn handle_socket(state: SharedState, room: Uuid, seat: PlayerNumber, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound frames flowing while inbound frames are awaited.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut topic = state.hub().subscribe(room);
    info!(room_id = %room, seat, "relay connected");

    loop {
        tokio::select! {
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = relay_inbound(&state, room, seat, text.as_str()) {
                        warn!(room_id = %room, seat, error = %err, "dropped inbound frame");
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = outbound_tx.send(Message::Pong(payload));
                }
                Some(Ok(Message::Close(frame))) => {
                    let _ = outbound_tx.send(Message::Close(frame));
                    break;
                }
                Some(Ok(Message::Binary(_) | Message::Pong(_))) => {}
                Some(Err(err)) => {
                    warn!(room_id = %room, seat, error = %err, "websocket error");
                    break;
                }
                None => break,
            },
            outbound = topic.recv() => match outbound {
                Ok(message) => match serde_json::to_string(&message) {
                    Ok(text) => {
                        if outbound_tx.send(Message::Text(text.into())).is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!(room_id = %room, error = %err, "failed to encode room message"),
                },
                Err(RecvError::Lagged(skipped)) => {
                    // The client resynchronises from `GET /rooms/{id}` on its own.
                    debug!(room_id = %room, seat, skipped, "relay lagged behind");
                }
                Err(RecvError::Closed) => {
                    let _ = outbound_tx.send(Message::Close(None));
                    break;
                }
            },
        }
    }

    info!(room_id = %room, seat, "relay disconnected");
    finalize(writer_task, outbound_tx).await;
}

fn relay_inbound(
    state: &SharedState,
    room: Uuid,
    seat: PlayerNumber,
    text: &str,
) -> Result<(), RelayError> {
    let message: RoomMessage = serde_json::from_str(text)?;
    if let Some(claimed) = claimed_seat(&message)
        && claimed != seat
    {
        return Err(RelayError::Impersonation { seat, claimed });
    }
    state.hub().publish(room, message);
    Ok(())
}

/// Seat a message speaks for, when it names one.
fn claimed_seat(message: &RoomMessage) -> Option<PlayerNumber> {
    match message {
        RoomMessage::PlayerJoin { participant } => Some(participant.player),
        RoomMessage::PlayerLeave { player }
        | RoomMessage::PlayerReady { player, .. }
        | RoomMessage::Action { player, .. }
        | RoomMessage::Heartbeat { player } => Some(*player),
        RoomMessage::GameStart { authority, .. } => Some(*authority),
        RoomMessage::StateUpdate { author, .. } => Some(*author),
        RoomMessage::GameEnd { .. } | RoomMessage::Rematch { .. } => None,
    }
}

async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
