use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the room store and report the current mode.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_room_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "room store health check failed");
            }
        }
        Err(_) => warn!("room store unavailable (degraded mode)"),
    }

    let active_rooms = state.hub().topic_count();
    if state.is_degraded() {
        HealthResponse::degraded(active_rooms)
    } else {
        HealthResponse::ok(active_rooms)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{config::AppConfig, dao::room_store::memory::MemoryRoomStore, state::AppState};

    #[tokio::test]
    async fn reports_degraded_until_a_store_is_installed() {
        let state = AppState::new(AppConfig::default());
        assert_eq!(health_status(&state).await.status, "degraded");

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        let _topic = state.hub().subscribe(uuid::Uuid::new_v4());
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.active_rooms, 1);
    }
}
