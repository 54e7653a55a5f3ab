use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::rooms::{
        CreatePrivateRoomRequest, FindMatchRequest, JoinRoomRequest, MatchResponse,
        RoomWriteRequest, RoomView,
    },
    error::AppError,
    services::room_service,
    state::SharedState,
};

/// Routes for matchmaking, private rooms and room rows.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/rooms/match", post(find_match))
        .route("/rooms/match/{user_id}", delete(cancel_search))
        .route("/rooms/private", post(create_private_room))
        .route("/rooms/join", post(join_room))
        .route("/rooms/{id}", get(get_room).put(write_room))
}

/// Queue for a game and wait until the room is full.
#[utoipa::path(
    post,
    path = "/rooms/match",
    tag = "rooms",
    request_body = FindMatchRequest,
    responses(
        (status = 200, description = "Seated in a full room", body = MatchResponse),
        (status = 408, description = "No match before the search timeout"),
        (status = 409, description = "Search cancelled")
    )
)]
pub async fn find_match(
    State(state): State<SharedState>,
    Json(payload): Json<FindMatchRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    payload.validate()?;
    let ticket = room_service::find_match(&state, payload).await?;
    Ok(Json(ticket))
}

/// Cancel the pending search of a user. Cancelling twice is harmless.
#[utoipa::path(
    delete,
    path = "/rooms/match/{user_id}",
    tag = "rooms",
    params(("user_id" = String, Path, description = "User whose search is cancelled")),
    responses((status = 204, description = "No search is pending for the user anymore"))
)]
pub async fn cancel_search(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> StatusCode {
    room_service::cancel_search(&state, &user_id);
    StatusCode::NO_CONTENT
}

/// Open a private room joinable by code.
#[utoipa::path(
    post,
    path = "/rooms/private",
    tag = "rooms",
    request_body = CreatePrivateRoomRequest,
    responses((status = 200, description = "Room created", body = RoomView))
)]
pub async fn create_private_room(
    State(state): State<SharedState>,
    Json(payload): Json<CreatePrivateRoomRequest>,
) -> Result<Json<RoomView>, AppError> {
    payload.validate()?;
    let room = room_service::create_private_room(&state, payload).await?;
    Ok(Json(room))
}

/// Take a seat in a private room.
#[utoipa::path(
    post,
    path = "/rooms/join",
    tag = "rooms",
    request_body = JoinRoomRequest,
    responses(
        (status = 200, description = "Seated", body = MatchResponse),
        (status = 400, description = "Malformed code"),
        (status = 404, description = "No open room behind the code"),
        (status = 409, description = "Room full")
    )
)]
pub async fn join_room(
    State(state): State<SharedState>,
    Json(payload): Json<JoinRoomRequest>,
) -> Result<Json<MatchResponse>, AppError> {
    payload.validate()?;
    let ticket = room_service::join_by_code(&state, payload).await?;
    Ok(Json(ticket))
}

/// Read a room row.
#[utoipa::path(
    get,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Room", body = RoomView),
        (status = 404, description = "Unknown room")
    )
)]
pub async fn get_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoomView>, AppError> {
    let room = room_service::get_room(&state, id).await?;
    Ok(Json(room))
}

/// Compare-and-swap write of a room row.
#[utoipa::path(
    put,
    path = "/rooms/{id}",
    tag = "rooms",
    params(("id" = Uuid, Path, description = "Room identifier")),
    request_body = RoomWriteRequest,
    responses(
        (status = 200, description = "Written; carries the new version", body = RoomView),
        (status = 409, description = "Stale version or status regression")
    )
)]
pub async fn write_room(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RoomWriteRequest>,
) -> Result<Json<RoomView>, AppError> {
    payload.validate()?;
    let room = room_service::write_room(&state, id, payload).await?;
    Ok(Json(room))
}
