use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc, watch,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::{Handshake, ServerEvent, SystemStatus},
        ws::RoomMessage,
    },
    error::ServiceError,
    state::SharedState,
};

/// Subscribe a spectator to `room`, failing when the room does not exist.
pub async fn subscribe_room(
    state: &SharedState,
    room: Uuid,
) -> Result<broadcast::Receiver<RoomMessage>, ServiceError> {
    let store = state.require_room_store().await?;
    // Subscribe before the lookup so nothing published in between is lost.
    let receiver = state.hub().subscribe(room);
    if store.get(room).await?.is_none() {
        drop(receiver);
        if state.hub().subscriber_count(room) == 0 {
            state.hub().close(room);
        }
        return Err(ServiceError::NotFound(format!("room {room}")));
    }
    Ok(receiver)
}

/// First event of a spectator stream.
pub fn handshake(state: &SharedState, room: Uuid) -> Option<ServerEvent> {
    ServerEvent::json(
        Some("handshake".to_string()),
        &Handshake {
            room_id: room,
            message: "spectating room".into(),
            degraded: state.is_degraded(),
        },
    )
    .inspect_err(|err| warn!(room_id = %room, error = %err, "failed to encode handshake"))
    .ok()
}

/// Convert a room subscription into an SSE response mirroring public room messages.
///
/// Degraded mode changes are interleaved as `system_status` events.
pub fn to_sse_stream(
    room: Uuid,
    mut receiver: broadcast::Receiver<RoomMessage>,
    mut degraded: watch::Receiver<bool>,
    first: Option<ServerEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if let Some(first) = first
            && tx.send(Ok(to_event(first))).await.is_err()
        {
            return;
        }

        loop {
            let next = tokio::select! {
                _ = tx.closed() => break,
                changed = degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let value = *degraded.borrow_and_update();
                    ServerEvent::json(
                        Some("system_status".to_string()),
                        &SystemStatus { degraded: value },
                    )
                    .ok()
                }
                received = receiver.recv() => match received {
                    Ok(message) if message.is_public() => ServerEvent::room_message(&message).ok(),
                    Ok(_) => None,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(room_id = %room, skipped, "spectator lagged behind");
                        None
                    }
                },
            };

            if let Some(event) = next
                && tx.send(Ok(to_event(event))).await.is_err()
            {
                break;
            }
        }

        info!(room_id = %room, "spectator stream disconnected");
    });

    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn to_event(payload: ServerEvent) -> Event {
    let event = Event::default().data(payload.data);
    match payload.event {
        Some(name) => event.event(name),
        None => event,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        state::AppState,
    };

    #[tokio::test]
    async fn unknown_rooms_cannot_be_spectated() {
        let state = AppState::new(AppConfig::default());
        assert!(matches!(
            subscribe_room(&state, Uuid::new_v4()).await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(matches!(
            subscribe_room(&state, Uuid::new_v4()).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn handshake_reports_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let room = Uuid::new_v4();
        let event = handshake(&state, room).unwrap();
        assert_eq!(event.event.as_deref(), Some("handshake"));
        assert!(event.data.contains(r#""degraded":true"#));
        assert!(event.data.contains(&room.to_string()));
    }
}
