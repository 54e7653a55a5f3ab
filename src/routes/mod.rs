use axum::Router;

use crate::state::SharedState;

/// OpenAPI and Swagger UI routes.
pub mod docs;
/// Health check route.
pub mod health;
/// Computer opponent route.
pub mod opponent;
/// Matchmaking and room routes.
pub mod rooms;
/// Spectator stream route.
pub mod sse;
/// WebSocket relay route.
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(rooms::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(opponent::router())
        .merge(docs::router());

    api_router.with_state(state)
}
