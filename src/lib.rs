//! Library crate for room-sync-back: matchmaking, room lifecycle, turn authority, game engines
//! and the relay server, exposed for the binaries and integration tests.

/// Per-participant room controller and session driver.
pub mod client;
/// Environment-driven configuration.
pub mod config;
/// Persistence of rooms.
pub mod dao;
/// Wire and HTTP payloads.
pub mod dto;
/// Game engines and the computer opponent.
pub mod engine;
/// Service and HTTP error types.
pub mod error;
/// HTTP, SSE and WebSocket routes.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared application state, rooms and the room bus.
pub mod state;
