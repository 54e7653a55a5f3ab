use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{ParticipantEntity, RoomEntity},
    engine::{GameId, PlayerNumber},
    state::room::{RoomStatus, Visibility},
};

/// Room row as laid out in the `rooms` collection.
///
/// Ids are stored as hyphenated strings and counters as `i64`, the widest integer BSON carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    id: String,
    game: GameId,
    status: RoomStatus,
    visibility: Visibility,
    code: Option<String>,
    creator: String,
    capacity: i32,
    created_at: DateTime,
    updated_at: DateTime,
    winner: Option<String>,
    participants: Vec<MongoParticipantDocument>,
    game_state: Option<String>,
    version: i64,
    authority: i32,
    last_seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MongoParticipantDocument {
    user_id: String,
    player: i32,
    ready: bool,
    connected: bool,
    last_seen: DateTime,
}

impl MongoRoomDocument {
    /// Override the stored version, used when writing the bumped row.
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = to_bson_int(version);
        self
    }
}

impl From<RoomEntity> for MongoRoomDocument {
    fn from(value: RoomEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game: value.game,
            status: value.status,
            visibility: value.visibility,
            code: value.code,
            creator: value.creator,
            capacity: i32::from(value.capacity),
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            winner: value.winner,
            participants: value
                .participants
                .into_iter()
                .map(|participant| MongoParticipantDocument {
                    user_id: participant.user_id,
                    player: i32::from(participant.player),
                    ready: participant.ready,
                    connected: participant.connected,
                    last_seen: DateTime::from_system_time(participant.last_seen),
                })
                .collect(),
            game_state: value.game_state,
            version: to_bson_int(value.version),
            authority: i32::from(value.authority),
            last_seq: to_bson_int(value.last_seq),
        }
    }
}

impl TryFrom<MongoRoomDocument> for RoomEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoomDocument) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&value.id).map_err(|err| MongoDaoError::MalformedDocument {
            id: Uuid::nil(),
            message: format!("invalid _id `{}`: {err}", value.id),
        })?;
        let malformed = |field: &str| MongoDaoError::MalformedDocument {
            id,
            message: format!("`{field}` is out of range"),
        };

        let participants = value
            .participants
            .into_iter()
            .map(|participant| {
                Ok(ParticipantEntity {
                    user_id: participant.user_id,
                    player: to_player(participant.player).ok_or_else(|| malformed("player"))?,
                    ready: participant.ready,
                    connected: participant.connected,
                    last_seen: participant.last_seen.to_system_time(),
                })
            })
            .collect::<Result<Vec<_>, MongoDaoError>>()?;

        Ok(Self {
            id,
            game: value.game,
            status: value.status,
            visibility: value.visibility,
            code: value.code,
            creator: value.creator,
            capacity: u8::try_from(value.capacity).map_err(|_| malformed("capacity"))?,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            winner: value.winner,
            participants,
            game_state: value.game_state,
            version: u64::try_from(value.version).map_err(|_| malformed("version"))?,
            authority: to_player(value.authority).ok_or_else(|| malformed("authority"))?,
            last_seq: u64::try_from(value.last_seq).map_err(|_| malformed("last_seq"))?,
        })
    }
}

fn to_player(value: i32) -> Option<PlayerNumber> {
    PlayerNumber::try_from(value).ok()
}

fn to_bson_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Filter selecting a room by id.
pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

/// Filter matching `id` only while it is still at `version`.
pub fn doc_id_at(id: Uuid, version: u64) -> Document {
    doc! {"_id": id.to_string(), "version": to_bson_int(version)}
}
