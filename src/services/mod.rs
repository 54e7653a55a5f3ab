/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Queue matchmaking and private room codes.
pub mod matchmaking;
/// Computer opponent answers.
pub mod opponent_service;
/// Periodic cleanup of closed and idle rooms.
pub mod reaper;
/// Room reads and compare-and-swap writes over HTTP.
pub mod room_service;
/// Spectator streams over Server-Sent Events.
pub mod sse_service;
/// Room store connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// WebSocket relay on room topics.
pub mod websocket_service;
