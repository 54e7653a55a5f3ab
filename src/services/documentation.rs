use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification of the room relay.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rooms::find_match,
        crate::routes::rooms::cancel_search,
        crate::routes::rooms::create_private_room,
        crate::routes::rooms::join_room,
        crate::routes::rooms::get_room,
        crate::routes::rooms::write_room,
        crate::routes::sse::room_stream,
        crate::routes::websocket::ws_handler,
        crate::routes::opponent::opponent_move,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::rooms::FindMatchRequest,
            crate::dto::rooms::CreatePrivateRoomRequest,
            crate::dto::rooms::JoinRoomRequest,
            crate::dto::rooms::MatchResponse,
            crate::dto::rooms::RoomView,
            crate::dto::rooms::ParticipantView,
            crate::dto::rooms::RoomWriteRequest,
            crate::dto::rooms::ParticipantWrite,
            crate::dto::rooms::OpponentMoveRequest,
            crate::dto::rooms::OpponentMoveResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::engine::GameId,
            crate::engine::minimax::Difficulty,
            crate::engine::minimax::Opponent,
            crate::state::room::RoomStatus,
            crate::state::room::QueueClass,
            crate::state::room::Visibility,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rooms", description = "Matchmaking, private rooms and room rows"),
        (name = "sse", description = "Read-only spectator streams"),
        (name = "relay", description = "WebSocket relay on room topics"),
        (name = "opponent", description = "Computer opponent for Connect-Five"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/rooms/match",
            "/rooms/match/{user_id}",
            "/rooms/private",
            "/rooms/join",
            "/rooms/{id}",
            "/rooms/{id}/ws",
            "/rooms/{id}/events",
            "/opponent/move",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
