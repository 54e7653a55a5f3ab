use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Room, matchmaking and opponent payloads.
pub mod rooms;
/// Spectator stream payloads.
pub mod sse;
/// Custom field validators.
pub mod validation;
/// Room bus messages.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
