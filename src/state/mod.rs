/// In-process publish/subscribe on room topics.
pub mod bus;
/// Room rows and their lifecycle rules.
pub mod room;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, oneshot, watch};
use uuid::Uuid;

use crate::{config::AppConfig, dao::room_store::RoomStore, error::ServiceError};

pub use self::bus::RoomHub;
use self::room::UserId;

/// State handle shared by every handler.
pub type SharedState = Arc<AppState>;

/// Cancellation handle of one in-flight matchmaking search.
pub struct PendingSearch {
    /// Identifies the search so a finished one does not unregister its successor.
    pub id: Uuid,
    /// Fired to cancel the search.
    pub cancel: oneshot::Sender<()>,
}

/// In-flight matchmaking searches, keyed by user.
pub type SearchRegistry = DashMap<UserId, PendingSearch>;

/// Central application state: the room store slot, the room bus and configuration.
pub struct AppState {
    room_store: RwLock<Option<Arc<dyn RoomStore>>>,
    hub: Arc<RoomHub>,
    searches: Arc<SearchRegistry>,
    degraded: watch::Sender<bool>,
    config: Arc<AppConfig>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            room_store: RwLock::new(None),
            hub: Arc::new(RoomHub::new(config.bus_capacity)),
            searches: Arc::new(DashMap::new()),
            degraded: degraded_tx,
            config: Arc::new(config),
        })
    }

    /// Obtain a handle to the current room store, if one is installed.
    pub async fn room_store(&self) -> Option<Arc<dyn RoomStore>> {
        let guard = self.room_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new room store implementation and leave degraded mode.
    pub async fn install_room_store(&self, store: Arc<dyn RoomStore>) {
        {
            let mut guard = self.room_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current room store and enter degraded mode.
    pub async fn clear_room_store(&self) {
        {
            let mut guard = self.room_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Room store handle, or [`ServiceError::Degraded`] while none is usable.
    pub async fn require_room_store(&self) -> Result<Arc<dyn RoomStore>, ServiceError> {
        if self.is_degraded() {
            return Err(ServiceError::Degraded);
        }
        self.room_store().await.ok_or(ServiceError::Degraded)
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Per-room broadcast bus.
    pub fn hub(&self) -> &Arc<RoomHub> {
        &self.hub
    }

    /// In-flight matchmaking searches.
    pub fn searches(&self) -> &Arc<SearchRegistry> {
        &self.searches
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Arc<AppConfig> {
        &self.config
    }

    /// Broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::room_store::memory::MemoryRoomStore;

    #[tokio::test]
    async fn installing_a_store_leaves_degraded_mode() {
        let state = AppState::new(AppConfig::default());
        let mut watcher = state.degraded_watcher();
        assert!(state.is_degraded());
        assert!(*watcher.borrow_and_update());
        assert!(matches!(
            state.require_room_store().await,
            Err(ServiceError::Degraded)
        ));

        state
            .install_room_store(Arc::new(MemoryRoomStore::new()))
            .await;
        assert!(!state.is_degraded());
        assert!(state.require_room_store().await.is_ok());
        assert!(watcher.has_changed().unwrap());
        assert!(!*watcher.borrow_and_update());

        state.clear_room_store().await;
        assert!(state.is_degraded());
        assert!(*watcher.borrow_and_update());
        assert!(matches!(
            state.require_room_store().await,
            Err(ServiceError::Degraded)
        ));
    }
}
