use axum::{
    Router,
    extract::{Path, Query, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{error::AppError, services::websocket_service, state::SharedState};

/// Identifies the participant opening the relay.
#[derive(Debug, Deserialize, IntoParams)]
pub struct RelayQuery {
    /// Seated user.
    pub user_id: String,
}

#[utoipa::path(
    get,
    path = "/rooms/{id}/ws",
    tag = "relay",
    params(("id" = Uuid, Path, description = "Room identifier"), RelayQuery),
    responses(
        (status = 101, description = "Switching protocols to the room relay"),
        (status = 404, description = "Unknown room"),
        (status = 409, description = "The user holds no seat")
    )
)]
/// Upgrade the HTTP connection into a relay on the room topic.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<RelayQuery>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    let seat = websocket_service::authorize(&state, id, &query.user_id).await?;
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(state, id, seat, socket)))
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/ws", get(ws_handler))
}
