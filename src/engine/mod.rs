//! Deterministic game-transition engines plugged into the room protocol.
//!
//! Every engine is a pure reducer: `init` builds the opening state from a seed, `apply` folds a
//! player action into a new state, and the terminal state carries a [`GameResult`]. The room
//! layer never looks inside a concrete state; it goes through [`GameState`], a tagged union keyed
//! by [`GameId`], to read `current_turn` and `result` generically.

pub mod blackjack;
pub mod cards;
pub mod connect_five;
pub mod mastermind;
pub mod minimax;
pub mod poker;

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use self::{
    blackjack::{Blackjack, BlackjackState},
    connect_five::{ConnectFive, ConnectFiveState},
    mastermind::{Color, Mastermind, MastermindState},
    poker::{Poker, PokerState},
};

/// Seat number inside a room, starting at 1.
pub type PlayerNumber = u8;

/// Games the room protocol knows how to host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum GameId {
    /// Two seats against an automated dealer.
    Blackjack,
    /// Heads-up five-card showdown with a single betting round.
    Poker,
    /// Cooperative code breaking.
    Mastermind,
    /// Column-drop connection game.
    ConnectFive,
}

impl GameId {
    /// Every hosted game.
    pub const ALL: [GameId; 4] = [
        GameId::Blackjack,
        GameId::Poker,
        GameId::Mastermind,
        GameId::ConnectFive,
    ];

    /// Fixed number of seats a room of this game holds.
    pub const fn capacity(self) -> u8 {
        match self {
            GameId::Mastermind => 4,
            GameId::Blackjack | GameId::Poker | GameId::ConnectFive => 2,
        }
    }

    /// Cooperative games are won or lost by the whole table.
    pub const fn is_cooperative(self) -> bool {
        matches!(self, GameId::Mastermind)
    }

    /// Stable identifier used in persistence filters and logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            GameId::Blackjack => "blackjack",
            GameId::Poker => "poker",
            GameId::Mastermind => "mastermind",
            GameId::ConnectFive => "connect_five",
        }
    }
}

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GameId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GameId::ALL
            .into_iter()
            .find(|game| game.as_str() == s)
            .ok_or_else(|| format!("unknown game `{s}`"))
    }
}

/// Why a match reached its terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The game rules produced a result.
    Completed,
    /// A participant gave up.
    Surrender,
    /// A participant's heartbeat lapsed while playing.
    Disconnect,
    /// A participant let the turn clock run out.
    TurnTimeout,
    /// A participant explicitly left the room mid-game.
    Left,
}

impl EndReason {
    /// Wire label, matching the serde representation.
    pub const fn as_str(self) -> &'static str {
        match self {
            EndReason::Completed => "completed",
            EndReason::Surrender => "surrender",
            EndReason::Disconnect => "disconnect",
            EndReason::TurnTimeout => "turn_timeout",
            EndReason::Left => "left",
        }
    }
}

/// Who came out on top.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    /// A single seat won.
    Winner {
        /// Winning seat.
        player: PlayerNumber,
    },
    /// Several seats share the win, e.g. whoever is left after a forfeit.
    Winners {
        /// Winning seats in seat order.
        players: Vec<PlayerNumber>,
    },
    /// Nobody won.
    Draw,
    /// Cooperative success shared by every seat.
    AllWin,
    /// Cooperative failure shared by every seat.
    AllLose,
}

impl Outcome {
    /// Seats credited with the win.
    pub fn winners(&self, seats: &[PlayerNumber]) -> Vec<PlayerNumber> {
        match self {
            Outcome::Winner { player } => vec![*player],
            Outcome::Winners { players } => players.clone(),
            Outcome::AllWin => seats.to_vec(),
            Outcome::Draw | Outcome::AllLose => Vec::new(),
        }
    }
}

/// Per-seat summary surfaced once a match is over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PlayerStat {
    /// Seat the stat belongs to.
    pub player: PlayerNumber,
    /// Engine-specific score (hand total, stack, guesses made, ...).
    pub score: i64,
    /// Short human-readable description.
    pub detail: String,
}

/// Terminal information attached to a finished [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GameResult {
    /// Winner, draw, or shared result.
    pub outcome: Outcome,
    /// What ended the game.
    pub reason: EndReason,
    /// Per-seat stats.
    pub stats: Vec<PlayerStat>,
}

/// Commands folded into a [`GameState`].
///
/// Gameplay variants are interpreted by the engine of the room's game; control variants
/// (`surrender`, `forfeit`, `pass_turn`) are handled identically for every game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameAction {
    /// Blackjack: draw a card.
    Hit,
    /// Blackjack: keep the current hand.
    Stand,
    /// Poker: pass without betting.
    Check,
    /// Poker: open the betting.
    Bet {
        /// Chips put into the pot.
        amount: u32,
    },
    /// Poker: match the outstanding bet.
    Call,
    /// Poker: give up the hand.
    Fold,
    /// Mastermind: submit a full code guess.
    Guess {
        /// Guessed colors, one per position.
        colors: Vec<Color>,
    },
    /// Connect-Five: drop a piece in a column.
    Drop {
        /// Zero-based column index.
        column: usize,
    },
    /// Give up the match, accepted regardless of turn.
    Surrender,
    /// Authority-issued loss for an absent or idle participant.
    Forfeit {
        /// Seat that loses.
        loser: PlayerNumber,
        /// Disconnect, turn timeout, or departure.
        reason: EndReason,
    },
    /// Authority-issued skip of an idle participant's turn.
    PassTurn {
        /// Seat whose turn is skipped.
        player: PlayerNumber,
    },
}

impl GameAction {
    /// Short label used in logs and rejections.
    pub const fn label(&self) -> &'static str {
        match self {
            GameAction::Hit => "hit",
            GameAction::Stand => "stand",
            GameAction::Check => "check",
            GameAction::Bet { .. } => "bet",
            GameAction::Call => "call",
            GameAction::Fold => "fold",
            GameAction::Guess { .. } => "guess",
            GameAction::Drop { .. } => "drop",
            GameAction::Surrender => "surrender",
            GameAction::Forfeit { .. } => "forfeit",
            GameAction::PassTurn { .. } => "pass_turn",
        }
    }

    /// Whether the action is a protocol-level control command rather than a move.
    pub const fn is_control(&self) -> bool {
        matches!(
            self,
            GameAction::Surrender | GameAction::Forfeit { .. } | GameAction::PassTurn { .. }
        )
    }

    /// Whether only the room authority may issue this action.
    pub const fn requires_authority(&self) -> bool {
        matches!(self, GameAction::Forfeit { .. } | GameAction::PassTurn { .. })
    }
}

/// Reason an engine refused an action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineRejection {
    /// The state is already terminal.
    #[error("the game is already over")]
    GameOver,
    /// The acting seat does not hold the turn.
    #[error("player {0} cannot act right now")]
    OutOfTurn(PlayerNumber),
    /// The acting seat is not part of the match.
    #[error("player {0} is not seated in this game")]
    UnknownPlayer(PlayerNumber),
    /// The action kind has no meaning for this game.
    #[error("action `{action}` is not part of {game}")]
    Unsupported {
        /// Game being played.
        game: GameId,
        /// Rejected action label.
        action: &'static str,
    },
    /// The action is well-formed but breaks a game rule.
    #[error("{0}")]
    Illegal(String),
}

/// Contract every pluggable reducer implements.
pub trait GameEngine {
    /// Engine-owned snapshot type.
    type State: Clone + PartialEq + fmt::Debug;

    /// Game this engine implements.
    const GAME: GameId;

    /// Build the opening state. All randomness comes from `seed`.
    fn init(&self, seed: u64, players: &[PlayerNumber]) -> Self::State;

    /// Fold a gameplay action into a new state.
    fn apply(
        &self,
        state: &Self::State,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<Self::State, EngineRejection>;

    /// Seats taking part, in turn order.
    fn players<'a>(&self, state: &'a Self::State) -> &'a [PlayerNumber];

    /// Seat expected to act next, if any.
    fn current_turn(&self, state: &Self::State) -> Option<PlayerNumber>;

    /// Terminal result, set only once the game is over.
    fn result<'a>(&self, state: &'a Self::State) -> Option<&'a GameResult>;

    /// Force the state into its terminal phase with the given result.
    fn conclude(&self, state: &Self::State, outcome: Outcome, reason: EndReason) -> Self::State;

    /// Skip the current seat's turn, when the game allows it.
    fn pass_turn(&self, _state: &Self::State) -> Option<Self::State> {
        None
    }

    /// Whether the state is terminal.
    fn is_terminal(&self, state: &Self::State) -> bool {
        self.result(state).is_some()
    }
}

/// Outcome of a surrender by `quitter`. A cooperative table gives up as a whole.
fn outcome_of_surrender<E: GameEngine>(
    engine: &E,
    state: &E::State,
    quitter: PlayerNumber,
) -> Outcome {
    if E::GAME.is_cooperative() {
        return Outcome::AllLose;
    }
    outcome_without(engine, state, quitter)
}

/// Outcome of removing `loser` from the table: everyone still seated wins.
fn outcome_without<E: GameEngine>(engine: &E, state: &E::State, loser: PlayerNumber) -> Outcome {
    let remaining: Vec<PlayerNumber> = engine
        .players(state)
        .iter()
        .copied()
        .filter(|player| *player != loser)
        .collect();
    match remaining.as_slice() {
        [] => Outcome::Draw,
        [player] => Outcome::Winner { player: *player },
        _ => Outcome::Winners { players: remaining },
    }
}

/// Shared front door for every engine: terminal and seat checks, then control actions, then
/// the engine's own rules.
fn apply_with<E: GameEngine>(
    engine: &E,
    state: &E::State,
    player: PlayerNumber,
    action: &GameAction,
) -> Result<E::State, EngineRejection> {
    if engine.is_terminal(state) {
        return Err(EngineRejection::GameOver);
    }
    if !engine.players(state).contains(&player) {
        return Err(EngineRejection::UnknownPlayer(player));
    }

    match action {
        GameAction::Surrender => {
            let outcome = outcome_of_surrender(engine, state, player);
            Ok(engine.conclude(state, outcome, EndReason::Surrender))
        }
        GameAction::Forfeit { loser, reason } => {
            if !engine.players(state).contains(loser) {
                return Err(EngineRejection::UnknownPlayer(*loser));
            }
            let outcome = outcome_without(engine, state, *loser);
            Ok(engine.conclude(state, outcome, *reason))
        }
        GameAction::PassTurn { player: idle } => {
            if engine.current_turn(state) != Some(*idle) {
                return Err(EngineRejection::OutOfTurn(*idle));
            }
            engine.pass_turn(state).ok_or_else(|| {
                EngineRejection::Illegal(format!("{} does not allow skipping turns", E::GAME))
            })
        }
        _ => {
            if engine.current_turn(state) != Some(player) {
                return Err(EngineRejection::OutOfTurn(player));
            }
            engine.apply(state, player, action)
        }
    }
}

/// Game snapshot shared by every participant of a room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "game", rename_all = "snake_case")]
pub enum GameState {
    /// Blackjack snapshot.
    Blackjack(BlackjackState),
    /// Poker snapshot.
    Poker(PokerState),
    /// Mastermind snapshot.
    Mastermind(MastermindState),
    /// Connect-Five snapshot.
    ConnectFive(ConnectFiveState),
}

impl GameState {
    /// Run the `init` transition of `game` for the given seats.
    pub fn init(game: GameId, seed: u64, players: &[PlayerNumber]) -> Self {
        match game {
            GameId::Blackjack => GameState::Blackjack(Blackjack.init(seed, players)),
            GameId::Poker => GameState::Poker(Poker.init(seed, players)),
            GameId::Mastermind => GameState::Mastermind(Mastermind.init(seed, players)),
            GameId::ConnectFive => GameState::ConnectFive(ConnectFive.init(seed, players)),
        }
    }

    /// Fold an action issued by `player` into a new state.
    pub fn apply(
        &self,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<GameState, EngineRejection> {
        match self {
            GameState::Blackjack(state) => {
                apply_with(&Blackjack, state, player, action).map(GameState::Blackjack)
            }
            GameState::Poker(state) => {
                apply_with(&Poker, state, player, action).map(GameState::Poker)
            }
            GameState::Mastermind(state) => {
                apply_with(&Mastermind, state, player, action).map(GameState::Mastermind)
            }
            GameState::ConnectFive(state) => {
                apply_with(&ConnectFive, state, player, action).map(GameState::ConnectFive)
            }
        }
    }

    /// Game this snapshot belongs to.
    pub fn game(&self) -> GameId {
        match self {
            GameState::Blackjack(_) => GameId::Blackjack,
            GameState::Poker(_) => GameId::Poker,
            GameState::Mastermind(_) => GameId::Mastermind,
            GameState::ConnectFive(_) => GameId::ConnectFive,
        }
    }

    /// Seat expected to act next.
    pub fn current_turn(&self) -> Option<PlayerNumber> {
        match self {
            GameState::Blackjack(state) => Blackjack.current_turn(state),
            GameState::Poker(state) => Poker.current_turn(state),
            GameState::Mastermind(state) => Mastermind.current_turn(state),
            GameState::ConnectFive(state) => ConnectFive.current_turn(state),
        }
    }

    /// Terminal result, if the game is over.
    pub fn result(&self) -> Option<&GameResult> {
        match self {
            GameState::Blackjack(state) => Blackjack.result(state),
            GameState::Poker(state) => Poker.result(state),
            GameState::Mastermind(state) => Mastermind.result(state),
            GameState::ConnectFive(state) => ConnectFive.result(state),
        }
    }

    /// Seats taking part in turn order.
    pub fn players(&self) -> &[PlayerNumber] {
        match self {
            GameState::Blackjack(state) => Blackjack.players(state),
            GameState::Poker(state) => Poker.players(state),
            GameState::Mastermind(state) => Mastermind.players(state),
            GameState::ConnectFive(state) => ConnectFive.players(state),
        }
    }

    /// Whether the snapshot is terminal.
    pub fn is_terminal(&self) -> bool {
        self.result().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn game_ids_round_trip_through_their_labels() {
        for game in GameId::ALL {
            assert_eq!(game.as_str().parse::<GameId>(), Ok(game));
        }
        assert!("chess".parse::<GameId>().is_err());
    }

    #[test]
    fn surrender_is_accepted_out_of_turn() {
        let state = GameState::init(GameId::ConnectFive, 7, &[1, 2]);
        assert_eq!(state.current_turn(), Some(1));

        let next = state.apply(2, &GameAction::Surrender).unwrap();
        let result = next.result().unwrap();
        assert_eq!(result.outcome, Outcome::Winner { player: 1 });
        assert_eq!(result.reason, EndReason::Surrender);
        assert_eq!(next.current_turn(), None);
    }

    #[test]
    fn forfeit_at_a_full_table_credits_every_remaining_seat() {
        let state = GameState::init(GameId::Mastermind, 7, &[1, 2, 3, 4]);
        let next = state
            .apply(
                1,
                &GameAction::Forfeit {
                    loser: 3,
                    reason: EndReason::Disconnect,
                },
            )
            .unwrap();
        let result = next.result().unwrap();
        assert_eq!(
            result.outcome,
            Outcome::Winners {
                players: vec![1, 2, 4]
            }
        );
        assert_eq!(result.reason, EndReason::Disconnect);
        assert_eq!(result.outcome.winners(&[1, 2, 3, 4]), vec![1, 2, 4]);
    }

    #[test]
    fn surrender_in_cooperative_game_loses_for_everyone() {
        let state = GameState::init(GameId::Mastermind, 7, &[1, 2, 3, 4]);
        let next = state.apply(2, &GameAction::Surrender).unwrap();
        assert_eq!(next.result().unwrap().outcome, Outcome::AllLose);
        assert!(next.result().unwrap().outcome.winners(&[1, 2, 3, 4]).is_empty());
    }

    #[test]
    fn actions_after_the_end_are_rejected() {
        let state = GameState::init(GameId::Poker, 11, &[1, 2]);
        let over = state.apply(1, &GameAction::Surrender).unwrap();
        assert_eq!(
            over.apply(2, &GameAction::Check),
            Err(EngineRejection::GameOver)
        );
    }

    #[test]
    fn out_of_turn_moves_are_rejected() {
        let state = GameState::init(GameId::ConnectFive, 1, &[1, 2]);
        assert_eq!(
            state.apply(2, &GameAction::Drop { column: 3 }),
            Err(EngineRejection::OutOfTurn(2))
        );
        assert_eq!(
            state.apply(9, &GameAction::Drop { column: 3 }),
            Err(EngineRejection::UnknownPlayer(9))
        );
    }

    #[test]
    fn pass_turn_must_target_the_seat_on_turn() {
        let state = GameState::init(GameId::Mastermind, 5, &[1, 2]);
        assert_eq!(
            state.apply(1, &GameAction::PassTurn { player: 2 }),
            Err(EngineRejection::OutOfTurn(2))
        );
        let next = state.apply(1, &GameAction::PassTurn { player: 1 }).unwrap();
        assert_eq!(next.current_turn(), Some(2));
    }

    #[test]
    fn same_inputs_produce_identical_states() {
        for game in GameId::ALL {
            let seats: Vec<PlayerNumber> = (1..=game.capacity()).collect();
            let a = GameState::init(game, 42, &seats);
            let b = GameState::init(game, 42, &seats);
            assert_eq!(a, b, "{game} init is not deterministic");
            assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap()
            );
        }
    }
}
