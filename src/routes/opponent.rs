use axum::{Json, Router, routing::post};

use crate::{
    dto::rooms::{OpponentMoveRequest, OpponentMoveResponse},
    error::AppError,
    services::opponent_service,
    state::SharedState,
};

/// Single-player helper routes.
pub fn router() -> Router<SharedState> {
    Router::new().route("/opponent/move", post(opponent_move))
}

/// Ask the computer for its Connect-Five move.
#[utoipa::path(
    post,
    path = "/opponent/move",
    tag = "opponent",
    request_body = OpponentMoveRequest,
    responses(
        (status = 200, description = "Computer move, if it is its turn", body = OpponentMoveResponse),
        (status = 400, description = "Not a Connect-Five position")
    )
)]
pub async fn opponent_move(
    Json(payload): Json<OpponentMoveRequest>,
) -> Result<Json<OpponentMoveResponse>, AppError> {
    Ok(Json(opponent_service::next_move(payload)?))
}
