//! Turn authority and reconciliation of incoming `state_update` broadcasts.
//!
//! Every receiver keeps the last confirmed `(seq, state)` pair plus the relayed actions and the
//! announced seed. A broadcast that directly follows the confirmed state is re-derived locally
//! and rejected when it disagrees; anything else (late join, sequence gap) is adopted as is.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::engine::{EngineRejection, GameAction, GameId, GameState, PlayerNumber};

/// What happened to an accepted broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Taken without re-derivation.
    Adopted,
    /// Re-derived locally and found identical.
    Validated,
    /// Already confirmed; dropped.
    Duplicate,
}

/// Why a broadcast was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The state belongs to another game.
    #[error("state for {got} received in a {expected} room")]
    WrongGame {
        /// Game of the room.
        expected: GameId,
        /// Game of the received state.
        got: GameId,
    },
    /// A different state was already confirmed for this sequence number.
    #[error("sequence {seq} was already confirmed with another state")]
    Conflict {
        /// Contested sequence number.
        seq: u64,
    },
    /// The author is not allowed to publish this state.
    #[error("player {author} may not publish sequence {seq}")]
    Unauthorized {
        /// Publishing seat.
        author: PlayerNumber,
        /// Sequence number of the state.
        seq: u64,
    },
    /// Re-deriving the state from the relayed input gave another result.
    #[error("sequence {seq} does not match its relayed input")]
    Mismatch {
        /// Sequence number of the state.
        seq: u64,
    },
    /// The relayed action does not apply to the confirmed state.
    #[error("relayed action for sequence {seq} is invalid: {source}")]
    Engine {
        /// Sequence number of the state.
        seq: u64,
        /// Engine refusal.
        #[source]
        source: EngineRejection,
    },
}

#[derive(Debug, Clone)]
struct Announcement {
    seed: u64,
    authority: PlayerNumber,
    seats: Vec<PlayerNumber>,
}

/// Per-room reconciliation bookkeeping of one participant.
#[derive(Debug, Clone)]
pub struct Reconciler {
    game: GameId,
    announcement: Option<Announcement>,
    confirmed: Option<(u64, GameState)>,
    relayed: BTreeMap<u64, (PlayerNumber, GameAction)>,
}

impl Reconciler {
    /// Fresh reconciler for a room of `game`.
    pub fn new(game: GameId) -> Self {
        Self {
            game,
            announcement: None,
            confirmed: None,
            relayed: BTreeMap::new(),
        }
    }

    /// Remember the seed announced in `game_start` and the seats filled at that moment.
    pub fn record_start(&mut self, seed: u64, authority: PlayerNumber, seats: Vec<PlayerNumber>) {
        self.announcement = Some(Announcement {
            seed,
            authority,
            seats,
        });
    }

    /// Remember a relayed action until its state arrives.
    pub fn record_action(&mut self, player: PlayerNumber, seq: u64, action: GameAction) {
        if self.confirmed_seq().is_some_and(|confirmed| seq <= confirmed) {
            return;
        }
        self.relayed.insert(seq, (player, action));
    }

    /// Confirm a state computed locally (opening deal or own move).
    pub fn commit_local(&mut self, seq: u64, state: GameState) {
        self.confirm(seq, state);
    }

    /// Forget everything and start from `(seq, state)`, used after a resync from the store.
    pub fn reset(&mut self, seq: u64, state: Option<GameState>) {
        self.announcement = None;
        self.relayed.clear();
        self.confirmed = state.map(|state| (seq, state));
    }

    /// Sequence number the next locally produced state uses.
    pub fn next_seq(&self) -> u64 {
        self.confirmed_seq().map_or(0, |seq| seq + 1)
    }

    /// Last confirmed sequence number.
    pub fn confirmed_seq(&self) -> Option<u64> {
        self.confirmed.as_ref().map(|(seq, _)| *seq)
    }

    /// Last confirmed state.
    pub fn confirmed(&self) -> Option<&GameState> {
        self.confirmed.as_ref().map(|(_, state)| state)
    }

    /// Judge a `state_update` published by `author`, confirming it when accepted.
    ///
    /// `authority` is the seat the receiver currently considers the room authority.
    pub fn receive(
        &mut self,
        seq: u64,
        state: &GameState,
        author: PlayerNumber,
        authority: PlayerNumber,
    ) -> Result<Verdict, Rejection> {
        if state.game() != self.game {
            return Err(Rejection::WrongGame {
                expected: self.game,
                got: state.game(),
            });
        }

        if let Some((confirmed_seq, confirmed)) = &self.confirmed {
            if seq < *confirmed_seq {
                return Ok(Verdict::Duplicate);
            }
            if seq == *confirmed_seq {
                return if confirmed == state {
                    Ok(Verdict::Duplicate)
                } else {
                    Err(Rejection::Conflict { seq })
                };
            }
        }

        let expected = match (seq, &self.confirmed) {
            (0, _) => self.expected_deal(author)?,
            (_, Some((confirmed_seq, confirmed))) if seq == confirmed_seq + 1 => {
                self.expected_move(seq, confirmed, author, authority)?
            }
            _ => None,
        };

        let verdict = match expected {
            Some(expected) if expected != *state => return Err(Rejection::Mismatch { seq }),
            Some(_) => Verdict::Validated,
            None => Verdict::Adopted,
        };

        self.confirm(seq, state.clone());
        Ok(verdict)
    }

    fn expected_deal(&self, author: PlayerNumber) -> Result<Option<GameState>, Rejection> {
        let Some(announcement) = &self.announcement else {
            return Ok(None);
        };
        if author != announcement.authority {
            return Err(Rejection::Unauthorized { author, seq: 0 });
        }
        Ok(Some(GameState::init(
            self.game,
            announcement.seed,
            &announcement.seats,
        )))
    }

    fn expected_move(
        &self,
        seq: u64,
        confirmed: &GameState,
        author: PlayerNumber,
        authority: PlayerNumber,
    ) -> Result<Option<GameState>, Rejection> {
        let Some((actor, action)) = self.relayed.get(&seq) else {
            return Ok(None);
        };
        if *actor != author {
            return Err(Rejection::Unauthorized { author, seq });
        }
        let self_forfeit = matches!(action, GameAction::Forfeit { loser, .. } if *loser == author);
        if action.requires_authority() && author != authority && !self_forfeit {
            return Err(Rejection::Unauthorized { author, seq });
        }

        confirmed
            .apply(*actor, action)
            .map(Some)
            .map_err(|source| Rejection::Engine { seq, source })
    }

    fn confirm(&mut self, seq: u64, state: GameState) {
        self.relayed = self.relayed.split_off(&(seq + 1));
        self.confirmed = Some((seq, state));
    }
}
