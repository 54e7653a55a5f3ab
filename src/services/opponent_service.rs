use tracing::debug;

use crate::{
    dto::rooms::{OpponentMoveRequest, OpponentMoveResponse},
    engine::GameState,
    error::ServiceError,
};

/// Pick the computer's reply to a Connect-Five position.
pub fn next_move(request: OpponentMoveRequest) -> Result<OpponentMoveResponse, ServiceError> {
    let GameState::ConnectFive(position) = &request.state else {
        return Err(ServiceError::InvalidInput(format!(
            "the computer opponent only plays connect_five, not {}",
            request.state.game()
        )));
    };
    let action = request.opponent.respond(position);
    debug!(
        player = request.opponent.player,
        difficulty = ?request.opponent.difficulty,
        ?action,
        "computer opponent answered"
    );
    Ok(OpponentMoveResponse { action })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{
        GameAction, GameId,
        minimax::{Difficulty, Opponent},
    };

    #[test]
    fn answers_on_its_turn_only() {
        let state = GameState::init(GameId::ConnectFive, 7, &[1, 2]);
        let waiting = next_move(OpponentMoveRequest {
            opponent: Opponent::new(Difficulty::Easy, 2),
            state: state.clone(),
        })
        .unwrap();
        assert_eq!(waiting.action, None);

        let after = state.apply(1, &GameAction::Drop { column: 0 }).unwrap();
        let reply = next_move(OpponentMoveRequest {
            opponent: Opponent::new(Difficulty::Medium, 2),
            state: after,
        })
        .unwrap();
        assert!(matches!(reply.action, Some(GameAction::Drop { .. })));
    }

    #[test]
    fn other_games_are_refused() {
        let err = next_move(OpponentMoveRequest {
            opponent: Opponent::new(Difficulty::Hard, 2),
            state: GameState::init(GameId::Poker, 7, &[1, 2]),
        })
        .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
