//! Durable record of a match: seats, lifecycle status, serialized game state and the CAS version.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    engine::{GameId, GameState, PlayerNumber},
    error::SyncError,
};

/// Opaque identifier of a portal user.
pub type UserId = String;

/// Lifecycle of a room. Declaration order is the only direction a room may move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    /// Seats missing, or not everyone is ready.
    Waiting,
    /// Every seat is filled and ready; the setup authority deals.
    Ready,
    /// A game state is live.
    Playing,
    /// The game reached a result.
    Finished,
    /// Closed without a result (search timeout, idle reaping, early leave).
    Abandoned,
}

impl RoomStatus {
    /// Stable label used in persistence filters.
    pub const fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "waiting",
            RoomStatus::Ready => "ready",
            RoomStatus::Playing => "playing",
            RoomStatus::Finished => "finished",
            RoomStatus::Abandoned => "abandoned",
        }
    }

    /// Whether no more gameplay happens in this room.
    pub const fn is_closed(self) -> bool {
        matches!(self, RoomStatus::Finished | RoomStatus::Abandoned)
    }
}

/// Error returned when a status change would move a room backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("room status cannot go from {from:?} to {to:?}")]
pub struct StatusRegression {
    /// Current status.
    pub from: RoomStatus,
    /// Rejected target.
    pub to: RoomStatus,
}

/// Matchmaking pool a public room belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueueClass {
    /// Counts towards ratings.
    Ranked,
    /// Friendly games.
    Casual,
}

/// How a room can be entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Visibility {
    /// Filled by the matchmaking queue.
    Public {
        /// Queue the room is listed in.
        queue: QueueClass,
    },
    /// Joined by room code only.
    Private,
}

/// A seated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Portal user.
    pub user_id: UserId,
    /// Seat number, fixed once every seat is filled.
    pub player: PlayerNumber,
    /// Whether the participant asked to start.
    pub ready: bool,
    /// Whether the participant is currently attached to the room topic.
    pub connected: bool,
    /// Last time the participant was heard from.
    pub last_seen: SystemTime,
}

/// Shared row describing a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    /// Room identifier, also the broadcast topic.
    pub id: Uuid,
    /// Game hosted in the room.
    pub game: GameId,
    /// Lifecycle status.
    pub status: RoomStatus,
    /// Public queue or private code.
    pub visibility: Visibility,
    /// Join code of private rooms.
    pub code: Option<String>,
    /// User that created the room.
    pub creator: UserId,
    /// Fixed seat count.
    pub capacity: u8,
    /// Creation time.
    pub created_at: SystemTime,
    /// Last write time.
    pub updated_at: SystemTime,
    /// Winning user for single-winner results.
    pub winner: Option<UserId>,
    /// Seated users ordered by player number.
    pub participants: Vec<Participant>,
    /// Last published game snapshot.
    pub game_state: Option<GameState>,
    /// Compare-and-swap version, bumped by every successful store write.
    pub version: u64,
    /// Seat allowed to issue setup and control commands.
    pub authority: PlayerNumber,
    /// Sequence number of the last applied action.
    pub last_seq: u64,
}

impl Room {
    /// Create a room with `creator` seated as player 1.
    pub fn new(
        game: GameId,
        visibility: Visibility,
        code: Option<String>,
        creator: impl Into<UserId>,
        now: SystemTime,
    ) -> Self {
        let creator = creator.into();
        Self {
            id: Uuid::new_v4(),
            game,
            status: RoomStatus::Waiting,
            visibility,
            code,
            creator: creator.clone(),
            capacity: game.capacity(),
            created_at: now,
            updated_at: now,
            winner: None,
            participants: vec![Participant {
                user_id: creator,
                player: 1,
                ready: false,
                connected: true,
                last_seen: now,
            }],
            game_state: None,
            version: 0,
            authority: 1,
            last_seq: 0,
        }
    }

    /// Fresh room for a rematch: same game, same seats, nobody ready yet.
    pub fn rematch_of(previous: &Room, now: SystemTime) -> Self {
        let mut room = Room::new(
            previous.game,
            previous.visibility,
            None,
            previous.creator.clone(),
            now,
        );
        room.participants = previous
            .participants
            .iter()
            .map(|participant| Participant {
                ready: false,
                connected: true,
                last_seen: now,
                ..participant.clone()
            })
            .collect();
        room.elect_authority();
        room
    }

    /// Lowest player number with no participant.
    pub fn free_seat(&self) -> Option<PlayerNumber> {
        (1..=self.capacity).find(|player| self.participant_at(*player).is_none())
    }

    /// Whether every seat is taken.
    pub fn is_full(&self) -> bool {
        self.participants.len() >= usize::from(self.capacity)
    }

    /// Whether a newcomer could take a seat right now.
    pub fn is_open(&self) -> bool {
        self.status == RoomStatus::Waiting && !self.is_full()
    }

    /// Participant for `user_id`.
    pub fn participant(&self, user_id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    /// Mutable participant for `user_id`.
    pub fn participant_mut(&mut self, user_id: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.user_id == user_id)
    }

    /// Participant holding seat `player`.
    pub fn participant_at(&self, player: PlayerNumber) -> Option<&Participant> {
        self.participants.iter().find(|p| p.player == player)
    }

    /// Mutable participant holding seat `player`.
    pub fn participant_at_mut(&mut self, player: PlayerNumber) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.player == player)
    }

    /// Seat `user_id` in the next free seat. Rejoining returns the existing seat.
    pub fn add_participant(
        &mut self,
        user_id: &str,
        now: SystemTime,
    ) -> Result<PlayerNumber, SyncError> {
        if let Some(existing) = self.participant_mut(user_id) {
            existing.connected = true;
            existing.last_seen = now;
            return Ok(existing.player);
        }
        if self.status != RoomStatus::Waiting {
            return Err(SyncError::RoomFull(self.id));
        }
        let player = self.free_seat().ok_or(SyncError::RoomFull(self.id))?;
        self.participants.push(Participant {
            user_id: user_id.to_owned(),
            player,
            ready: false,
            connected: true,
            last_seen: now,
        });
        self.participants.sort_by_key(|p| p.player);
        self.updated_at = now;
        Ok(player)
    }

    /// Take `user_id` out of a room that has not started. Returns their seat.
    ///
    /// A partly filled room frees the seat for the next joiner. Seats are never reassigned once
    /// every seat has been filled, so leaving a full lobby keeps the seat and closes the room.
    pub fn remove_participant(&mut self, user_id: &str) -> Option<PlayerNumber> {
        if self.status >= RoomStatus::Playing {
            return None;
        }
        let index = self.participants.iter().position(|p| p.user_id == user_id)?;
        if self.is_full() {
            let leaver = &mut self.participants[index];
            leaver.connected = false;
            leaver.ready = false;
            let player = leaver.player;
            self.status = RoomStatus::Abandoned;
            self.elect_authority();
            return Some(player);
        }
        let removed = self.participants.remove(index);
        self.elect_authority();
        Some(removed.player)
    }

    /// Whether every seat is filled and every participant is ready.
    pub fn all_ready(&self) -> bool {
        self.is_full() && self.participants.iter().all(|p| p.ready)
    }

    /// Seat numbers in turn order.
    pub fn seats(&self) -> Vec<PlayerNumber> {
        let mut seats: Vec<PlayerNumber> = self.participants.iter().map(|p| p.player).collect();
        seats.sort_unstable();
        seats
    }

    /// User holding seat `player`.
    pub fn user_of(&self, player: PlayerNumber) -> Option<&UserId> {
        self.participant_at(player).map(|p| &p.user_id)
    }

    /// Recompute the authority as the lowest-numbered connected participant.
    ///
    /// Falls back to the lowest seat when nobody is connected. Returns whether it changed.
    pub fn elect_authority(&mut self) -> bool {
        let elected = self
            .participants
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.player)
            .min()
            .or_else(|| self.participants.iter().map(|p| p.player).min())
            .unwrap_or(1);
        let changed = elected != self.authority;
        self.authority = elected;
        changed
    }

    /// Move the room forward in its lifecycle.
    pub fn advance(&mut self, to: RoomStatus) -> Result<(), StatusRegression> {
        if to < self.status || (self.status.is_closed() && to != self.status) {
            return Err(StatusRegression {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }
}
