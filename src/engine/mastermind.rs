//! Cooperative Mastermind: the table shares one secret code and one pool of attempts.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};

use super::{
    EndReason, EngineRejection, GameAction, GameEngine, GameId, GameResult, Outcome,
    PlayerNumber, PlayerStat,
};

/// Pegs in a code.
pub const CODE_LENGTH: usize = 4;
/// Guesses the table may submit before losing.
pub const MAX_ATTEMPTS: usize = 10;

/// Peg color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum Color {
    Red,
    Blue,
    Green,
    Yellow,
    Purple,
    Orange,
}

impl Color {
    /// Palette the secret is drawn from.
    pub const ALL: [Color; 6] = [
        Color::Red,
        Color::Blue,
        Color::Green,
        Color::Yellow,
        Color::Purple,
        Color::Orange,
    ];

    const fn index(self) -> usize {
        self as usize
    }
}

/// Feedback for one guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    /// Right color in the right position.
    pub black: u8,
    /// Right color in the wrong position.
    pub white: u8,
}

/// Score `guess` against `secret`.
///
/// Exact matches are counted first and removed; each remaining color then scores
/// `min(count in secret, count in guess)` whites.
pub fn score(secret: &[Color], guess: &[Color]) -> Score {
    let mut black = 0;
    let mut secret_left = [0u8; Color::ALL.len()];
    let mut guess_left = [0u8; Color::ALL.len()];

    for (wanted, given) in secret.iter().zip(guess) {
        if wanted == given {
            black += 1;
        } else {
            secret_left[wanted.index()] += 1;
            guess_left[given.index()] += 1;
        }
    }
    let white = secret_left
        .iter()
        .zip(guess_left)
        .map(|(a, b)| (*a).min(b))
        .sum();

    Score { black, white }
}

/// One submitted guess and its feedback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// Seat that guessed.
    pub player: PlayerNumber,
    /// Guessed code.
    pub guess: Vec<Color>,
    /// Feedback.
    pub score: Score,
}

/// Mastermind phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MastermindPhase {
    /// Guesses are still allowed.
    Guessing,
    /// The code was found.
    Solved,
    /// Attempts ran out.
    Exhausted,
    /// Ended by a control action.
    Aborted,
}

/// Mastermind snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MastermindState {
    players: Vec<PlayerNumber>,
    secret: Vec<Color>,
    /// Current phase.
    pub phase: MastermindPhase,
    /// Guesses submitted so far.
    pub attempts: Vec<Attempt>,
    turn_index: usize,
    result: Option<GameResult>,
}

impl MastermindState {
    /// Attempts left to the table.
    pub fn remaining_attempts(&self) -> usize {
        MAX_ATTEMPTS.saturating_sub(self.attempts.len())
    }

    /// Secret code, revealed only once the game is over.
    pub fn revealed_secret(&self) -> Option<&[Color]> {
        self.result.as_ref().map(|_| self.secret.as_slice())
    }

    fn rotate(&mut self) {
        if !self.players.is_empty() {
            self.turn_index = (self.turn_index + 1) % self.players.len();
        }
    }

    fn stats(&self) -> Vec<PlayerStat> {
        self.players
            .iter()
            .map(|player| {
                let made = self
                    .attempts
                    .iter()
                    .filter(|attempt| attempt.player == *player)
                    .count();
                let best = self
                    .attempts
                    .iter()
                    .filter(|attempt| attempt.player == *player)
                    .map(|attempt| attempt.score.black)
                    .max()
                    .unwrap_or(0);
                PlayerStat {
                    player: *player,
                    score: made as i64,
                    detail: format!("{made} guesses, best {best} black"),
                }
            })
            .collect()
    }
}

/// Draw a secret code from the seed.
pub fn secret_from_seed(seed: u64) -> Vec<Color> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..CODE_LENGTH)
        .map(|_| Color::ALL[rng.random_range(0..Color::ALL.len())])
        .collect()
}

/// Mastermind reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mastermind;

impl Mastermind {
    /// Opening state with a known secret.
    pub fn with_secret(&self, secret: Vec<Color>, players: &[PlayerNumber]) -> MastermindState {
        MastermindState {
            players: players.to_vec(),
            secret,
            phase: MastermindPhase::Guessing,
            attempts: Vec::new(),
            turn_index: 0,
            result: None,
        }
    }

    fn finish(&self, state: &mut MastermindState, phase: MastermindPhase, outcome: Outcome) {
        state.phase = phase;
        state.result = Some(GameResult {
            outcome,
            reason: EndReason::Completed,
            stats: state.stats(),
        });
    }
}

impl GameEngine for Mastermind {
    type State = MastermindState;

    const GAME: GameId = GameId::Mastermind;

    fn init(&self, seed: u64, players: &[PlayerNumber]) -> Self::State {
        self.with_secret(secret_from_seed(seed), players)
    }

    fn apply(
        &self,
        state: &Self::State,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<Self::State, EngineRejection> {
        let GameAction::Guess { colors } = action else {
            return Err(EngineRejection::Unsupported {
                game: Self::GAME,
                action: action.label(),
            });
        };
        if colors.len() != CODE_LENGTH {
            return Err(EngineRejection::Illegal(format!(
                "a guess needs exactly {CODE_LENGTH} colors, got {}",
                colors.len()
            )));
        }

        let mut next = state.clone();
        let feedback = score(&next.secret, colors);
        next.attempts.push(Attempt {
            player,
            guess: colors.clone(),
            score: feedback,
        });

        if usize::from(feedback.black) == CODE_LENGTH {
            self.finish(&mut next, MastermindPhase::Solved, Outcome::AllWin);
        } else if next.attempts.len() >= MAX_ATTEMPTS {
            self.finish(&mut next, MastermindPhase::Exhausted, Outcome::AllLose);
        } else {
            next.rotate();
        }
        Ok(next)
    }

    fn players<'a>(&self, state: &'a Self::State) -> &'a [PlayerNumber] {
        &state.players
    }

    fn current_turn(&self, state: &Self::State) -> Option<PlayerNumber> {
        if state.result.is_some() {
            return None;
        }
        state.players.get(state.turn_index).copied()
    }

    fn result<'a>(&self, state: &'a Self::State) -> Option<&'a GameResult> {
        state.result.as_ref()
    }

    fn conclude(&self, state: &Self::State, outcome: Outcome, reason: EndReason) -> Self::State {
        let mut next = state.clone();
        next.phase = MastermindPhase::Aborted;
        next.result = Some(GameResult {
            outcome,
            reason,
            stats: next.stats(),
        });
        next
    }

    fn pass_turn(&self, state: &Self::State) -> Option<Self::State> {
        let mut next = state.clone();
        next.rotate();
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::Color::*;
    use super::*;

    #[test]
    fn exact_matches_are_black() {
        assert_eq!(
            score(&[Red, Blue, Green, Yellow], &[Red, Blue, Green, Yellow]),
            Score { black: 4, white: 0 }
        );
    }

    #[test]
    fn misplaced_colors_are_white() {
        assert_eq!(
            score(&[Red, Blue, Green, Yellow], &[Yellow, Green, Blue, Red]),
            Score { black: 0, white: 4 }
        );
    }

    #[test]
    fn duplicates_are_not_double_counted() {
        assert_eq!(
            score(&[Red, Red, Blue, Blue], &[Red, Blue, Red, Green]),
            Score { black: 1, white: 2 }
        );
        assert_eq!(
            score(&[Red, Blue, Green, Yellow], &[Red, Red, Red, Red]),
            Score { black: 1, white: 0 }
        );
    }

    #[test]
    fn solving_wins_for_the_whole_table() {
        let state = Mastermind.with_secret(vec![Red, Blue, Green, Yellow], &[1, 2]);
        let state = Mastermind
            .apply(
                &state,
                1,
                &GameAction::Guess {
                    colors: vec![Orange, Orange, Orange, Orange],
                },
            )
            .unwrap();
        assert_eq!(Mastermind.current_turn(&state), Some(2));

        let state = Mastermind
            .apply(
                &state,
                2,
                &GameAction::Guess {
                    colors: vec![Red, Blue, Green, Yellow],
                },
            )
            .unwrap();
        assert_eq!(state.phase, MastermindPhase::Solved);
        assert_eq!(state.result.as_ref().unwrap().outcome, Outcome::AllWin);
        assert_eq!(state.revealed_secret(), Some(&[Red, Blue, Green, Yellow][..]));
    }

    #[test]
    fn running_out_of_attempts_loses_for_everyone() {
        let mut state = Mastermind.with_secret(vec![Red, Red, Red, Red], &[1]);
        for _ in 0..MAX_ATTEMPTS {
            assert!(state.revealed_secret().is_none());
            state = Mastermind
                .apply(
                    &state,
                    1,
                    &GameAction::Guess {
                        colors: vec![Blue, Blue, Blue, Blue],
                    },
                )
                .unwrap();
        }
        assert_eq!(state.phase, MastermindPhase::Exhausted);
        assert_eq!(state.result.as_ref().unwrap().outcome, Outcome::AllLose);
        assert_eq!(state.remaining_attempts(), 0);
    }

    #[test]
    fn short_guesses_are_illegal() {
        let state = Mastermind.init(1, &[1, 2]);
        assert!(matches!(
            Mastermind.apply(&state, 1, &GameAction::Guess { colors: vec![Red] }),
            Err(EngineRejection::Illegal(_))
        ));
    }

    #[test]
    fn seeded_secrets_are_reproducible() {
        assert_eq!(secret_from_seed(12), secret_from_seed(12));
        assert_eq!(secret_from_seed(12).len(), CODE_LENGTH);
    }
}
