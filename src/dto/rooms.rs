use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, validation::validate_user_id},
    engine::{GameAction, GameId, GameState, PlayerNumber, minimax::Opponent},
    services::matchmaking::MatchTicket,
    state::room::{Participant, QueueClass, Room, RoomStatus, Visibility},
};

/// Payload for `POST /rooms/match`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct FindMatchRequest {
    /// Searching user.
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Game to play.
    pub game: GameId,
    /// Queue to search in.
    #[serde(default = "default_queue")]
    pub queue: QueueClass,
}

fn default_queue() -> QueueClass {
    QueueClass::Casual
}

/// Payload for `POST /rooms/private`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreatePrivateRoomRequest {
    /// Creating user, seated as player 1.
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Game to play.
    pub game: GameId,
}

/// Payload for `POST /rooms/join`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRoomRequest {
    /// Joining user.
    #[validate(custom(function = "validate_user_id"))]
    pub user_id: String,
    /// Room code, case-insensitive.
    #[validate(length(min = 1, max = 16))]
    pub code: String,
}

/// Seat assigned by matchmaking or a room code.
#[derive(Debug, Serialize, ToSchema)]
pub struct MatchResponse {
    /// Seat of the caller.
    pub player: PlayerNumber,
    /// Room the caller sits in.
    pub room: RoomView,
}

impl From<MatchTicket> for MatchResponse {
    fn from(ticket: MatchTicket) -> Self {
        Self {
            player: ticket.player,
            room: ticket.room.into(),
        }
    }
}

/// Seated participant as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct ParticipantView {
    /// Seated user.
    pub user_id: String,
    /// Seat number, starting at 1.
    pub player: PlayerNumber,
    /// Whether the seat has readied up.
    pub ready: bool,
    /// Whether the seat still heartbeats.
    pub connected: bool,
    /// RFC 3339 timestamp.
    pub last_seen: String,
}

impl From<Participant> for ParticipantView {
    fn from(participant: Participant) -> Self {
        Self {
            user_id: participant.user_id,
            player: participant.player,
            ready: participant.ready,
            connected: participant.connected,
            last_seen: format_system_time(participant.last_seen),
        }
    }
}

/// Room row as exposed over HTTP.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoomView {
    /// Room identifier.
    pub id: Uuid,
    /// Game played in the room.
    pub game: GameId,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Public queue or private code.
    pub visibility: Visibility,
    /// Join code of private rooms.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// User that created the room.
    pub creator: String,
    /// Fixed seat count.
    pub capacity: u8,
    /// RFC 3339 timestamp.
    pub created_at: String,
    /// RFC 3339 timestamp of the last write.
    pub updated_at: String,
    /// Winning user for single-winner results.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<String>,
    /// Seated users ordered by player number.
    pub participants: Vec<ParticipantView>,
    /// Game snapshot tagged by `game`.
    #[schema(value_type = Object)]
    pub game_state: Option<GameState>,
    /// Version to send back with `PUT /rooms/{id}`.
    pub version: u64,
    /// Seat allowed to issue setup and control commands.
    pub authority: PlayerNumber,
    /// Sequence number of `game_state`.
    pub last_seq: u64,
}

impl From<Room> for RoomView {
    fn from(room: Room) -> Self {
        Self {
            id: room.id,
            game: room.game,
            status: room.status,
            visibility: room.visibility,
            code: room.code,
            creator: room.creator,
            capacity: room.capacity,
            created_at: format_system_time(room.created_at),
            updated_at: format_system_time(room.updated_at),
            winner: room.winner,
            participants: room.participants.into_iter().map(Into::into).collect(),
            game_state: room.game_state,
            version: room.version,
            authority: room.authority,
            last_seq: room.last_seq,
        }
    }
}

/// Seat flags writable through `PUT /rooms/{id}`.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct ParticipantWrite {
    /// Seat being updated.
    pub player: PlayerNumber,
    /// New ready flag.
    pub ready: bool,
    /// New connection flag.
    pub connected: bool,
}

/// Compare-and-swap write of the mutable part of a room.
///
/// Seat assignment stays with matchmaking; only flags of existing seats can change.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct RoomWriteRequest {
    /// Version the caller read.
    pub version: u64,
    /// Target status; it may only move forward.
    pub status: RoomStatus,
    /// Winning user, when a single seat won.
    #[validate(custom(function = "validate_user_id"))]
    pub winner: Option<String>,
    /// Flags of existing seats.
    #[validate(nested, length(max = 8))]
    #[serde(default)]
    pub participants: Vec<ParticipantWrite>,
    /// Latest game snapshot.
    #[schema(value_type = Object)]
    pub game_state: Option<GameState>,
    /// Seat holding authority.
    #[validate(range(min = 1, max = 8))]
    pub authority: PlayerNumber,
    /// Sequence number of `game_state`.
    pub last_seq: u64,
}

/// Payload for `POST /opponent/move`.
#[derive(Debug, Deserialize, ToSchema)]
pub struct OpponentMoveRequest {
    /// Seat and strength of the computer.
    pub opponent: Opponent,
    /// Position to answer.
    #[schema(value_type = Object)]
    pub state: GameState,
}

/// Computer reply; empty when it is not the computer's turn.
#[derive(Debug, Serialize, ToSchema)]
pub struct OpponentMoveResponse {
    /// Chosen move.
    #[schema(value_type = Option<Object>)]
    pub action: Option<GameAction>,
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    #[test]
    fn room_view_formats_timestamps_and_hides_missing_code() {
        let room = Room::new(
            GameId::Mastermind,
            Visibility::Public {
                queue: QueueClass::Ranked,
            },
            None,
            "alice",
            SystemTime::UNIX_EPOCH,
        );
        let json = serde_json::to_value(RoomView::from(room)).unwrap();
        assert_eq!(json["created_at"], "1970-01-01T00:00:00Z");
        assert_eq!(json["visibility"]["kind"], "public");
        assert!(json.get("code").is_none());
        assert_eq!(json["participants"][0]["player"], 1);
    }

    #[test]
    fn requests_are_validated() {
        let request: FindMatchRequest =
            serde_json::from_str(r#"{"user_id": "  ", "game": "poker"}"#).unwrap();
        assert_eq!(request.queue, QueueClass::Casual);
        assert!(request.validate().is_err());

        let write: RoomWriteRequest = serde_json::from_str(
            r#"{"version": 1, "status": "playing", "winner": null, "game_state": null,
                "authority": 0, "last_seq": 0}"#,
        )
        .unwrap();
        assert!(write.validate().is_err());
    }

    #[test]
    fn seat_flags_are_validated_and_echo_back() {
        let write: RoomWriteRequest = serde_json::from_str(
            r#"{"version": 3, "status": "waiting", "winner": null, "game_state": null,
                "authority": 1, "last_seq": 0,
                "participants": [{"player": 2, "ready": true, "connected": false}]}"#,
        )
        .unwrap();
        assert!(write.validate().is_ok());

        let echoed = serde_json::to_value(&write.participants[0]).unwrap();
        assert_eq!(echoed["player"], 2);
        assert_eq!(echoed["ready"], true);
    }
}
