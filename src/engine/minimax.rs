//! Alpha-beta search for the Connect-Five single-player opponent.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{
    GameAction, GameEngine, PlayerNumber,
    connect_five::{Board, COLUMNS, CONNECT, ConnectFive, ConnectFiveState, ROWS},
};

/// Score of a won position, before the depth bonus that prefers quicker wins.
pub const WIN: i32 = 1_000_000;

/// Center-first move ordering; it makes alpha-beta cut much earlier.
const ORDER: [usize; COLUMNS] = [3, 2, 4, 1, 5, 0, 6];
const CENTER: usize = COLUMNS / 2;

/// Search depth presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// One ply.
    Easy,
    /// Three plies.
    #[default]
    Medium,
    /// Five plies.
    Hard,
}

impl Difficulty {
    /// Plies searched at this difficulty.
    pub const fn depth(self) -> u8 {
        match self {
            Difficulty::Easy => 1,
            Difficulty::Medium => 3,
            Difficulty::Hard => 5,
        }
    }
}

fn score_window(window: [Option<PlayerNumber>; CONNECT], me: PlayerNumber, opp: PlayerNumber) -> i32 {
    let own = window.iter().filter(|cell| **cell == Some(me)).count();
    let theirs = window.iter().filter(|cell| **cell == Some(opp)).count();
    let empty = window.iter().filter(|cell| cell.is_none()).count();

    match (own, theirs, empty) {
        (4, _, _) => 100,
        (3, _, 1) => 5,
        (2, _, 2) => 2,
        (_, 3, 1) => -80,
        _ => 0,
    }
}

/// Static evaluation of `board` from `me`'s point of view.
pub fn evaluate(board: &Board, me: PlayerNumber, opp: PlayerNumber) -> i32 {
    let center = (0..ROWS)
        .filter(|row| board.cells[*row][CENTER] == Some(me))
        .count() as i32;
    let mut score = center * 3;

    for (dr, dc) in [(0isize, 1isize), (1, 0), (1, 1), (1, -1)] {
        for row in 0..ROWS as isize {
            for column in 0..COLUMNS as isize {
                let end_row = row + dr * (CONNECT as isize - 1);
                let end_column = column + dc * (CONNECT as isize - 1);
                if end_row < 0
                    || end_row >= ROWS as isize
                    || end_column < 0
                    || end_column >= COLUMNS as isize
                {
                    continue;
                }
                let window: [Option<PlayerNumber>; CONNECT] = std::array::from_fn(|step| {
                    let step = step as isize;
                    board.get(row + dr * step, column + dc * step)
                });
                score += score_window(window, me, opp);
            }
        }
    }
    score
}

fn search(
    board: &Board,
    depth: u8,
    mut alpha: i32,
    mut beta: i32,
    maximizing: bool,
    me: PlayerNumber,
    opp: PlayerNumber,
) -> i32 {
    if depth == 0 {
        return evaluate(board, me, opp);
    }
    let mover = if maximizing { me } else { opp };
    let mut best = if maximizing { i32::MIN } else { i32::MAX };
    let mut moved = false;

    for column in ORDER {
        let mut child = *board;
        let Some(row) = child.drop_piece(column, mover) else {
            continue;
        };
        moved = true;
        let score = if child.wins_at(row, column) {
            let value = WIN + i32::from(depth);
            if maximizing { value } else { -value }
        } else {
            search(&child, depth - 1, alpha, beta, !maximizing, me, opp)
        };

        if maximizing {
            best = best.max(score);
            alpha = alpha.max(best);
        } else {
            best = best.min(score);
            beta = beta.min(best);
        }
        if alpha >= beta {
            break;
        }
    }

    if moved { best } else { 0 }
}

/// Best column for `me` searching `depth` plies, or `None` when the board is full.
///
/// Ties keep the earlier column of the center-first ordering.
pub fn best_move(board: &Board, me: PlayerNumber, opp: PlayerNumber, depth: u8) -> Option<usize> {
    let depth = depth.max(1);
    let mut best: Option<(usize, i32)> = None;
    let mut alpha = i32::MIN;

    for column in ORDER {
        let mut child = *board;
        let Some(row) = child.drop_piece(column, me) else {
            continue;
        };
        let score = if child.wins_at(row, column) {
            WIN + i32::from(depth)
        } else {
            search(&child, depth - 1, alpha, i32::MAX, false, me, opp)
        };
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((column, score));
            alpha = alpha.max(score);
        }
    }
    best.map(|(column, _)| column)
}

/// Computer-controlled seat for single-player Connect-Five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Opponent {
    /// Search depth preset.
    pub difficulty: Difficulty,
    /// Seat played by the computer.
    pub player: PlayerNumber,
}

impl Opponent {
    /// Build an opponent playing `player`.
    pub const fn new(difficulty: Difficulty, player: PlayerNumber) -> Self {
        Self { difficulty, player }
    }

    /// Next move when it is this seat's turn in a live game.
    pub fn respond(&self, state: &ConnectFiveState) -> Option<GameAction> {
        if ConnectFive.current_turn(state) != Some(self.player) {
            return None;
        }
        let opp = state.opponent_of(self.player)?;
        best_move(&state.board, self.player, opp, self.difficulty.depth())
            .map(|column| GameAction::Drop { column })
    }
}
