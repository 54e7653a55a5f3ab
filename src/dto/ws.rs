use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    engine::{EndReason, GameAction, GameState, Outcome, PlayerNumber},
    state::room::Participant,
};

/// Messages exchanged on a room topic.
///
/// Every participant publishes and receives the same vocabulary; the relay server forwards them
/// verbatim between WebSocket clients and in-process sessions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RoomMessage {
    /// A participant took a seat or reattached.
    PlayerJoin {
        /// Seat as stored in the room.
        participant: Participant,
    },
    /// A participant left the room.
    PlayerLeave {
        /// Seat that was freed.
        player: PlayerNumber,
    },
    /// A participant toggled readiness.
    PlayerReady {
        /// Seat that toggled.
        player: PlayerNumber,
        /// New ready flag.
        ready: bool,
    },
    /// The setup authority dealt the opening state from `seed`.
    GameStart {
        /// Seed of the opening deal.
        seed: u64,
        /// Seat that dealt.
        authority: PlayerNumber,
    },
    /// Relayed command, folded into the state published under the same `seq`.
    Action {
        /// Acting seat.
        player: PlayerNumber,
        /// Sequence number the resulting state will carry.
        seq: u64,
        /// The command itself.
        payload: GameAction,
    },
    /// Canonical full state after applying action `seq` (0 for the opening deal).
    StateUpdate {
        /// Full snapshot.
        state: GameState,
        /// Sequence number of the snapshot.
        seq: u64,
        /// Seat that validated and published it.
        author: PlayerNumber,
    },
    /// The game reached its terminal phase.
    GameEnd {
        /// Who won.
        outcome: Outcome,
        /// What ended the game.
        reason: EndReason,
    },
    /// Presence beacon.
    Heartbeat {
        /// Seat that is still alive.
        player: PlayerNumber,
    },
    /// Pointer to the room allocated by a rematch.
    Rematch {
        /// The new room.
        room_id: Uuid,
    },
}

impl RoomMessage {
    /// Wire tag, used as the SSE event name.
    pub const fn kind(&self) -> &'static str {
        match self {
            RoomMessage::PlayerJoin { .. } => "player_join",
            RoomMessage::PlayerLeave { .. } => "player_leave",
            RoomMessage::PlayerReady { .. } => "player_ready",
            RoomMessage::GameStart { .. } => "game_start",
            RoomMessage::Action { .. } => "action",
            RoomMessage::StateUpdate { .. } => "state_update",
            RoomMessage::GameEnd { .. } => "game_end",
            RoomMessage::Heartbeat { .. } => "heartbeat",
            RoomMessage::Rematch { .. } => "rematch",
        }
    }

    /// Whether spectators get to see the message.
    pub const fn is_public(&self) -> bool {
        !matches!(self, RoomMessage::Heartbeat { .. })
    }
}
