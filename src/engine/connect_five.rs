//! Column-drop connection game on a 6x7 board.
//!
//! Pieces fall to the lowest free row of a column; row 0 is the bottom. Lining up
//! [`CONNECT`] pieces horizontally, vertically or diagonally wins, and a full board is a draw.

use serde::{Deserialize, Serialize};

use super::{
    EndReason, EngineRejection, GameAction, GameEngine, GameId, GameResult, Outcome,
    PlayerNumber, PlayerStat,
};

/// Board height.
pub const ROWS: usize = 6;
/// Board width.
pub const COLUMNS: usize = 7;
/// Pieces in a row needed to win.
pub const CONNECT: usize = 4;

/// Cell grid, indexed `[row][column]` with row 0 at the bottom.
pub type Grid = [[Option<PlayerNumber>; COLUMNS]; ROWS];

const DIRECTIONS: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

/// Playing surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Board {
    /// Cells, bottom row first.
    pub cells: Grid,
}

impl Board {
    /// Cell content, `None` when out of bounds or empty.
    pub fn get(&self, row: isize, column: isize) -> Option<PlayerNumber> {
        if row < 0 || column < 0 {
            return None;
        }
        self.cells
            .get(row as usize)
            .and_then(|cells| cells.get(column as usize))
            .copied()
            .flatten()
    }

    /// Lowest free row in `column`, if the column exists and has room.
    pub fn landing_row(&self, column: usize) -> Option<usize> {
        if column >= COLUMNS {
            return None;
        }
        (0..ROWS).find(|row| self.cells[*row][column].is_none())
    }

    /// Drop a piece and return the row it landed in.
    pub fn drop_piece(&mut self, column: usize, player: PlayerNumber) -> Option<usize> {
        let row = self.landing_row(column)?;
        self.cells[row][column] = Some(player);
        Some(row)
    }

    /// Columns that can still take a piece.
    pub fn open_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..COLUMNS).filter(|column| self.landing_row(*column).is_some())
    }

    /// Whether no column has room.
    pub fn is_full(&self) -> bool {
        self.open_columns().next().is_none()
    }

    /// Whether the piece at `(row, column)` completes a line.
    pub fn wins_at(&self, row: usize, column: usize) -> bool {
        let Some(player) = self.cells[row][column] else {
            return false;
        };
        let (row, column) = (row as isize, column as isize);
        DIRECTIONS.iter().any(|(dr, dc)| {
            let run = |sign: isize| {
                (1..CONNECT as isize)
                    .take_while(|step| {
                        self.get(row + sign * step * dr, column + sign * step * dc)
                            == Some(player)
                    })
                    .count()
            };
            1 + run(1) + run(-1) >= CONNECT
        })
    }

    /// Whether `player` has any complete line on the board.
    pub fn has_line(&self, player: PlayerNumber) -> bool {
        (0..ROWS).any(|row| {
            (0..COLUMNS)
                .any(|column| self.cells[row][column] == Some(player) && self.wins_at(row, column))
        })
    }

    /// Pieces on the board.
    pub fn piece_count(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_some()).count()
    }
}

/// Connect-Five snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectFiveState {
    players: Vec<PlayerNumber>,
    /// Board.
    pub board: Board,
    /// Last drop, as `(row, column)`.
    pub last_move: Option<(usize, usize)>,
    current_turn: Option<PlayerNumber>,
    result: Option<GameResult>,
}

impl ConnectFiveState {
    /// Seat that moves after `player`.
    pub fn opponent_of(&self, player: PlayerNumber) -> Option<PlayerNumber> {
        self.players.iter().copied().find(|seat| *seat != player)
    }

    fn stats(&self) -> Vec<PlayerStat> {
        self.players
            .iter()
            .map(|player| {
                let pieces = self
                    .board
                    .cells
                    .iter()
                    .flatten()
                    .filter(|cell| **cell == Some(*player))
                    .count();
                PlayerStat {
                    player: *player,
                    score: pieces as i64,
                    detail: format!("{pieces} pieces played"),
                }
            })
            .collect()
    }
}

/// Connect-Five reducer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConnectFive;

impl GameEngine for ConnectFive {
    type State = ConnectFiveState;

    const GAME: GameId = GameId::ConnectFive;

    fn init(&self, _seed: u64, players: &[PlayerNumber]) -> Self::State {
        ConnectFiveState {
            players: players.to_vec(),
            board: Board::default(),
            last_move: None,
            current_turn: players.first().copied(),
            result: None,
        }
    }

    fn apply(
        &self,
        state: &Self::State,
        player: PlayerNumber,
        action: &GameAction,
    ) -> Result<Self::State, EngineRejection> {
        let GameAction::Drop { column } = action else {
            return Err(EngineRejection::Unsupported {
                game: Self::GAME,
                action: action.label(),
            });
        };
        let mut next = state.clone();
        let row = next
            .board
            .drop_piece(*column, player)
            .ok_or_else(|| EngineRejection::Illegal(format!("column {column} is not playable")))?;
        next.last_move = Some((row, *column));

        if next.board.wins_at(row, *column) {
            next.current_turn = None;
            next.result = Some(GameResult {
                outcome: Outcome::Winner { player },
                reason: EndReason::Completed,
                stats: next.stats(),
            });
        } else if next.board.is_full() {
            next.current_turn = None;
            next.result = Some(GameResult {
                outcome: Outcome::Draw,
                reason: EndReason::Completed,
                stats: next.stats(),
            });
        } else {
            next.current_turn = next.opponent_of(player);
        }
        Ok(next)
    }

    fn players<'a>(&self, state: &'a Self::State) -> &'a [PlayerNumber] {
        &state.players
    }

    fn current_turn(&self, state: &Self::State) -> Option<PlayerNumber> {
        state.current_turn
    }

    fn result<'a>(&self, state: &'a Self::State) -> Option<&'a GameResult> {
        state.result.as_ref()
    }

    fn conclude(&self, state: &Self::State, outcome: Outcome, reason: EndReason) -> Self::State {
        let mut next = state.clone();
        next.current_turn = None;
        next.result = Some(GameResult {
            outcome,
            reason,
            stats: next.stats(),
        });
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(columns: &[usize]) -> ConnectFiveState {
        let mut state = ConnectFive.init(0, &[1, 2]);
        for column in columns {
            let player = state.current_turn.unwrap();
            state = ConnectFive
                .apply(&state, player, &GameAction::Drop { column: *column })
                .unwrap();
        }
        state
    }

    #[test]
    fn pieces_stack_from_the_bottom() {
        let state = play(&[3, 3, 3]);
        assert_eq!(state.board.cells[0][3], Some(1));
        assert_eq!(state.board.cells[1][3], Some(2));
        assert_eq!(state.board.cells[2][3], Some(1));
        assert_eq!(state.last_move, Some((2, 3)));
        assert_eq!(state.current_turn, Some(2));
    }

    #[test]
    fn horizontal_line_wins() {
        let state = play(&[0, 0, 1, 1, 2, 2, 3]);
        let result = state.result.as_ref().unwrap();
        assert_eq!(result.outcome, Outcome::Winner { player: 1 });
        assert_eq!(state.current_turn, None);
        assert!(state.board.has_line(1));
    }

    #[test]
    fn vertical_line_wins() {
        let state = play(&[6, 0, 6, 0, 6, 0, 5, 0]);
        assert_eq!(
            state.result.as_ref().unwrap().outcome,
            Outcome::Winner { player: 2 }
        );
    }

    #[test]
    fn diagonal_line_wins() {
        // 1 builds the rising diagonal (0,0) (1,1) (2,2) (3,3).
        let state = play(&[0, 1, 1, 2, 2, 3, 2, 3, 3, 6, 3]);
        assert_eq!(
            state.result.as_ref().unwrap().outcome,
            Outcome::Winner { player: 1 }
        );
    }

    #[test]
    fn full_columns_are_rejected() {
        let state = play(&[4, 4, 4, 4, 4, 4]);
        assert!(matches!(
            ConnectFive.apply(&state, 1, &GameAction::Drop { column: 4 }),
            Err(EngineRejection::Illegal(_))
        ));
        assert!(matches!(
            ConnectFive.apply(&state, 1, &GameAction::Drop { column: COLUMNS }),
            Err(EngineRejection::Illegal(_))
        ));
    }

    #[test]
    fn full_board_without_a_line_is_a_draw() {
        // Alternating columns, flipped for the upper half: runs never exceed three.
        let mut board = Board::default();
        for column in 0..COLUMNS {
            for row in 0..ROWS {
                board.cells[row][column] = Some(1 + ((column + row / 3) % 2) as PlayerNumber);
            }
        }
        // Clear the top-right cell so the last drop fills the board.
        let last = board.cells[ROWS - 1][COLUMNS - 1].take().unwrap();
        assert!(!board.has_line(1) && !board.has_line(2));

        let mut state = ConnectFive.init(0, &[1, 2]);
        state.board = board;
        state.current_turn = Some(last);
        let state = ConnectFive
            .apply(&state, last, &GameAction::Drop { column: COLUMNS - 1 })
            .unwrap();
        assert_eq!(state.result.as_ref().unwrap().outcome, Outcome::Draw);
    }
}
