use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::{
    dao::storage::{StorageError, StorageResult},
    engine::{GameId, GameState, PlayerNumber},
    state::room::{Participant, Room, RoomStatus, Visibility},
};

/// Representation of a room as stored by every backend.
///
/// The game state is kept as an opaque JSON document so backends never need to understand the
/// per-game variants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoomEntity {
    /// Stable identifier for the room.
    pub id: Uuid,
    /// Hosted game.
    pub game: GameId,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Public queue or private.
    pub visibility: Visibility,
    /// Join code of private rooms.
    pub code: Option<String>,
    /// Creating user.
    pub creator: String,
    /// Seat count.
    pub capacity: u8,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
    /// Winning user, if any.
    pub winner: Option<String>,
    /// Seated users.
    pub participants: Vec<ParticipantEntity>,
    /// Serialized game state.
    pub game_state: Option<String>,
    /// Compare-and-swap version.
    pub version: u64,
    /// Authority seat.
    pub authority: PlayerNumber,
    /// Last applied action sequence number.
    pub last_seq: u64,
}

/// Seat record embedded in a [`RoomEntity`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Portal user.
    pub user_id: String,
    /// Seat number.
    pub player: PlayerNumber,
    /// Ready flag.
    pub ready: bool,
    /// Connected flag.
    pub connected: bool,
    /// Last time the participant was heard from.
    pub last_seen: SystemTime,
}

impl From<&Participant> for ParticipantEntity {
    fn from(value: &Participant) -> Self {
        Self {
            user_id: value.user_id.clone(),
            player: value.player,
            ready: value.ready,
            connected: value.connected,
            last_seen: value.last_seen,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            user_id: value.user_id,
            player: value.player,
            ready: value.ready,
            connected: value.connected,
            last_seen: value.last_seen,
        }
    }
}

impl RoomEntity {
    /// Snapshot a domain room into its stored shape.
    pub fn from_room(room: &Room) -> StorageResult<Self> {
        let game_state = room
            .game_state
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|err| StorageError::Corrupt {
                id: room.id,
                message: format!("game state does not serialize: {err}"),
            })?;

        Ok(Self {
            id: room.id,
            game: room.game,
            status: room.status,
            visibility: room.visibility,
            code: room.code.clone(),
            creator: room.creator.clone(),
            capacity: room.capacity,
            created_at: room.created_at,
            updated_at: room.updated_at,
            winner: room.winner.clone(),
            participants: room.participants.iter().map(Into::into).collect(),
            game_state,
            version: room.version,
            authority: room.authority,
            last_seq: room.last_seq,
        })
    }

    /// Decode the stored shape back into a domain room.
    pub fn into_room(self) -> StorageResult<Room> {
        let id = self.id;
        let game_state = self
            .game_state
            .as_deref()
            .map(serde_json::from_str::<GameState>)
            .transpose()
            .map_err(|err| StorageError::Corrupt {
                id,
                message: format!("game state does not parse: {err}"),
            })?;

        if let Some(state) = &game_state
            && state.game() != self.game
        {
            return Err(StorageError::Corrupt {
                id,
                message: format!(
                    "room hosts {} but its state belongs to {}",
                    self.game,
                    state.game()
                ),
            });
        }

        Ok(Room {
            id,
            game: self.game,
            status: self.status,
            visibility: self.visibility,
            code: self.code,
            creator: self.creator,
            capacity: self.capacity,
            created_at: self.created_at,
            updated_at: self.updated_at,
            winner: self.winner,
            participants: self.participants.into_iter().map(Into::into).collect(),
            game_state,
            version: self.version,
            authority: self.authority,
            last_seq: self.last_seq,
        })
    }
}
