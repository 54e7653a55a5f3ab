use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::ws::RoomMessage;

#[derive(Clone, Debug)]
/// Event ready to be written on a spectator stream.
pub struct ServerEvent {
    /// Event name, if any.
    pub event: Option<String>,
    /// Serialised payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Mirror of a room bus message, named after its `type` tag.
    pub fn room_message(message: &RoomMessage) -> serde_json::Result<Self> {
        Self::json(Some(message.kind().to_owned()), message)
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// First event sent to a spectator.
pub struct Handshake {
    /// Mirrored room.
    pub room_id: Uuid,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a room store connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    /// Whether the room store is unreachable.
    pub degraded: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_messages_are_named_by_type() {
        let event = ServerEvent::room_message(&RoomMessage::PlayerLeave { player: 2 }).unwrap();
        assert_eq!(event.event.as_deref(), Some("player_leave"));
        assert_eq!(event.data, r#"{"type":"player_leave","player":2}"#);
    }
}
