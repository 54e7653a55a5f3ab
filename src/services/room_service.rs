//! HTTP-facing room operations: matchmaking, private codes and compare-and-swap writes.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dto::rooms::{
        CreatePrivateRoomRequest, FindMatchRequest, JoinRoomRequest, MatchResponse,
        RoomWriteRequest, RoomView,
    },
    error::ServiceError,
    services::matchmaking::Matchmaker,
    state::{SharedState, room::Room},
};

/// Matchmaker bound to the currently installed room store.
pub async fn matchmaker(state: &SharedState) -> Result<Matchmaker, ServiceError> {
    let store = state.require_room_store().await?;
    Ok(Matchmaker::new(
        store,
        state.hub().clone(),
        state.config().clone(),
        state.searches().clone(),
    ))
}

/// Queue the caller and wait for a full room.
pub async fn find_match(
    state: &SharedState,
    request: FindMatchRequest,
) -> Result<MatchResponse, ServiceError> {
    let ticket = matchmaker(state)
        .await?
        .find_match(request.game, request.queue, &request.user_id)
        .await?;
    Ok(ticket.into())
}

/// Cancel the pending search of `user_id`. Returns whether one was running.
pub fn cancel_search(state: &SharedState, user_id: &str) -> bool {
    let cancelled = state
        .searches()
        .remove(user_id)
        .is_some_and(|(_, pending)| pending.cancel.send(()).is_ok());
    if cancelled {
        info!(user = user_id, "search cancelled");
    }
    cancelled
}

/// Open a private room for the caller.
pub async fn create_private_room(
    state: &SharedState,
    request: CreatePrivateRoomRequest,
) -> Result<RoomView, ServiceError> {
    let room = matchmaker(state)
        .await?
        .create_private_room(request.game, &request.user_id)
        .await?;
    Ok(room.into())
}

/// Seat the caller in the room behind a code.
pub async fn join_by_code(
    state: &SharedState,
    request: JoinRoomRequest,
) -> Result<MatchResponse, ServiceError> {
    let ticket = matchmaker(state)
        .await?
        .join_by_code(&request.code, &request.user_id)
        .await?;
    Ok(ticket.into())
}

/// Fetch a room.
pub async fn get_room(state: &SharedState, id: Uuid) -> Result<RoomView, ServiceError> {
    let store = state.require_room_store().await?;
    store
        .get(id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound(format!("room {id}")))
}

/// Overwrite the mutable part of a room if nobody wrote since `request.version`.
pub async fn write_room(
    state: &SharedState,
    id: Uuid,
    request: RoomWriteRequest,
) -> Result<RoomView, ServiceError> {
    let store = state.require_room_store().await?;
    let mut room = store
        .get(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {id}")))?;
    if room.version != request.version {
        return Err(ServiceError::InvalidState(format!(
            "room {id} is at version {}, not {}",
            room.version, request.version
        )));
    }

    apply_write(&mut room, request)?;
    let version = store.update(room.clone()).await?;
    room.version = version;
    info!(room_id = %id, version, status = room.status.as_str(), "room written");
    Ok(room.into())
}

fn apply_write(room: &mut Room, request: RoomWriteRequest) -> Result<(), ServiceError> {
    room.advance(request.status)
        .map_err(|err| ServiceError::InvalidState(err.to_string()))?;

    if let Some(state) = &request.game_state
        && state.game() != room.game
    {
        return Err(ServiceError::InvalidInput(format!(
            "state for {} sent to a {} room",
            state.game(),
            room.game
        )));
    }
    if room.participant_at(request.authority).is_none() {
        return Err(ServiceError::InvalidInput(format!(
            "authority {} holds no seat",
            request.authority
        )));
    }
    if let Some(winner) = &request.winner
        && room.participant(winner).is_none()
    {
        return Err(ServiceError::InvalidInput(format!(
            "winner `{winner}` holds no seat"
        )));
    }

    for seat in request.participants {
        let participant = room.participant_at_mut(seat.player).ok_or_else(|| {
            ServiceError::InvalidInput(format!("player {} holds no seat", seat.player))
        })?;
        participant.ready = seat.ready;
        participant.connected = seat.connected;
    }

    room.winner = request.winner;
    room.game_state = request.game_state;
    room.authority = request.authority;
    room.last_seq = request.last_seq;
    room.updated_at = SystemTime::now();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::room_store::memory::MemoryRoomStore,
        dto::rooms::ParticipantWrite,
        engine::{GameId, GameState},
        state::{
            AppState,
            room::{RoomStatus, Visibility},
        },
    };

    async fn state_with_room(game: GameId) -> (SharedState, Room) {
        let state = AppState::new(AppConfig::default());
        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let view = create_private_room(
            &state,
            CreatePrivateRoomRequest {
                user_id: "alice".into(),
                game,
            },
        )
        .await
        .unwrap();
        let store = state.room_store().await.unwrap();
        let room = store.get(view.id).await.unwrap().unwrap();
        (state, room)
    }

    fn write_for(room: &Room) -> RoomWriteRequest {
        RoomWriteRequest {
            version: room.version,
            status: room.status,
            winner: None,
            participants: vec![ParticipantWrite {
                player: 1,
                ready: true,
                connected: true,
            }],
            game_state: None,
            authority: 1,
            last_seq: 0,
        }
    }

    #[tokio::test]
    async fn degraded_state_refuses_requests() {
        let state = AppState::new(AppConfig::default());
        let err = get_room(&state, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Degraded));
    }

    #[tokio::test]
    async fn writes_are_compare_and_swap() {
        let (state, room) = state_with_room(GameId::Poker).await;
        assert_eq!(room.visibility, Visibility::Private);

        let written = write_room(&state, room.id, write_for(&room)).await.unwrap();
        assert_eq!(written.version, room.version + 1);
        assert!(written.participants[0].ready);

        let stale = write_room(&state, room.id, write_for(&room)).await.unwrap_err();
        assert!(matches!(stale, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn writes_are_checked_against_the_room() {
        let (state, room) = state_with_room(GameId::Poker).await;

        let mut foreign = write_for(&room);
        foreign.game_state = Some(GameState::init(GameId::Mastermind, 1, &[1]));
        assert!(matches!(
            write_room(&state, room.id, foreign).await,
            Err(ServiceError::InvalidInput(_))
        ));

        let mut stranger = write_for(&room);
        stranger.authority = 2;
        assert!(matches!(
            write_room(&state, room.id, stranger).await,
            Err(ServiceError::InvalidInput(_))
        ));

        let mut closed = write_for(&room);
        closed.status = RoomStatus::Abandoned;
        write_room(&state, room.id, closed).await.unwrap();
        let reopened = write_for(&room);
        let fresh = get_room(&state, room.id).await.unwrap();
        let reopened = RoomWriteRequest {
            version: fresh.version,
            status: RoomStatus::Waiting,
            ..reopened
        };
        assert!(matches!(
            write_room(&state, room.id, reopened).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn cancelling_without_a_search_is_a_no_op() {
        let state = AppState::new(AppConfig::default());
        assert!(!cancel_search(&state, "nobody"));
    }
}
