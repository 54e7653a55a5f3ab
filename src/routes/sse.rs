use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/rooms/{id}/events",
    tag = "sse",
    params(("id" = Uuid, Path, description = "Room identifier")),
    responses(
        (status = 200, description = "Read-only room mirror", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown room")
    )
)]
/// Mirror the public messages of a room to a spectator.
pub async fn room_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let receiver = sse_service::subscribe_room(&state, id).await?;
    info!(room_id = %id, "new spectator stream");
    Ok(sse_service::to_sse_stream(
        id,
        receiver,
        state.degraded_watcher(),
        sse_service::handshake(&state, id),
    ))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/rooms/{id}/events", get(room_stream))
}
