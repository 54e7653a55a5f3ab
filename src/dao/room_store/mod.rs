/// In-process store.
pub mod memory;
/// MongoDB-backed store.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{dao::storage::StorageResult, engine::GameId, state::room::Room};

/// Abstraction over the persistence layer for rooms.
///
/// Writes are full-row overwrites guarded by the room `version`: `update` only succeeds when the
/// stored version equals `room.version`, and the stored copy is bumped by one.
pub trait RoomStore: Send + Sync {
    /// Insert a new room. Fails if the id is already taken.
    fn create(&self, room: Room) -> BoxFuture<'static, StorageResult<Uuid>>;
    /// Fetch a room by id.
    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Room>>>;
    /// Compare-and-swap overwrite, returning the new version.
    fn update(&self, room: Room) -> BoxFuture<'static, StorageResult<u64>>;
    /// Resolve a join code among rooms that are not closed.
    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Room>>>;
    /// Waiting rooms of `game`, oldest first.
    fn list_open_by_game(&self, game: GameId) -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Remove a room, returning whether it existed.
    fn delete(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// Finished or abandoned rooms last written before `cutoff`.
    fn list_closed_before(&self, cutoff: SystemTime)
    -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Waiting rooms last written before `cutoff`.
    fn list_waiting_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<Room>>>;
    /// Probe the backend.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Rebuild the backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
