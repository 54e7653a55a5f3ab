//! Process-local room store, used by tests and by the server when no database is configured.

use std::{sync::Arc, time::SystemTime};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::future::BoxFuture;
use uuid::Uuid;

use super::RoomStore;
use crate::{
    dao::{
        models::RoomEntity,
        storage::{StorageError, StorageResult},
    },
    engine::GameId,
    state::room::{Room, RoomStatus},
};

/// Room store backed by a concurrent hash map of stored entities.
#[derive(Clone, Default)]
pub struct MemoryRoomStore {
    rooms: Arc<DashMap<Uuid, RoomEntity>>,
}

impl MemoryRoomStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rooms.
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Whether the store holds no room.
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    fn collect<F>(&self, keep: F) -> StorageResult<Vec<Room>>
    where
        F: Fn(&RoomEntity) -> bool,
    {
        let mut entities: Vec<RoomEntity> = self
            .rooms
            .iter()
            .filter(|entry| keep(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        entities.sort_by_key(|entity| (entity.created_at, entity.id));
        entities.into_iter().map(RoomEntity::into_room).collect()
    }

    fn insert(&self, room: &Room) -> StorageResult<Uuid> {
        let entity = RoomEntity::from_room(room)?;
        match self.rooms.entry(room.id) {
            Entry::Occupied(_) => Err(StorageError::VersionConflict {
                id: room.id,
                expected: room.version,
            }),
            Entry::Vacant(slot) => {
                slot.insert(entity);
                Ok(room.id)
            }
        }
    }

    fn swap(&self, room: &Room) -> StorageResult<u64> {
        let mut entity = RoomEntity::from_room(room)?;
        let Some(mut stored) = self.rooms.get_mut(&room.id) else {
            return Err(StorageError::NotFound { id: room.id });
        };
        if stored.version != room.version {
            return Err(StorageError::VersionConflict {
                id: room.id,
                expected: room.version,
            });
        }
        entity.version = room.version + 1;
        *stored = entity;
        Ok(room.version + 1)
    }
}

impl RoomStore for MemoryRoomStore {
    fn create(&self, room: Room) -> BoxFuture<'static, StorageResult<Uuid>> {
        let result = self.insert(&room);
        Box::pin(async move { result })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let result = self
            .rooms
            .get(&id)
            .map(|entry| entry.value().clone().into_room())
            .transpose();
        Box::pin(async move { result })
    }

    fn update(&self, room: Room) -> BoxFuture<'static, StorageResult<u64>> {
        let result = self.swap(&room);
        Box::pin(async move { result })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let result = self
            .collect(|entity| {
                entity.code.as_deref() == Some(code.as_str()) && !entity.status.is_closed()
            })
            .map(|rooms| rooms.into_iter().next());
        Box::pin(async move { result })
    }

    fn list_open_by_game(&self, game: GameId) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let result =
            self.collect(|entity| entity.game == game && entity.status == RoomStatus::Waiting);
        Box::pin(async move { result })
    }

    fn delete(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self.rooms.remove(&id).is_some();
        Box::pin(async move { Ok(removed) })
    }

    fn list_closed_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let result =
            self.collect(|entity| entity.status.is_closed() && entity.updated_at < cutoff);
        Box::pin(async move { result })
    }

    fn list_waiting_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let result = self
            .collect(|entity| entity.status == RoomStatus::Waiting && entity.updated_at < cutoff);
        Box::pin(async move { result })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::state::room::{QueueClass, Visibility};

    fn room_at(game: GameId, secs: u64) -> Room {
        Room::new(
            game,
            Visibility::Public {
                queue: QueueClass::Casual,
            },
            None,
            format!("user-{secs}"),
            SystemTime::UNIX_EPOCH + Duration::from_secs(secs),
        )
    }

    #[tokio::test]
    async fn update_is_compare_and_swap() {
        let store = MemoryRoomStore::new();
        let mut room = room_at(GameId::Blackjack, 0);
        store.create(room.clone()).await.unwrap();

        let stale = room.clone();
        room.add_participant("bob", SystemTime::UNIX_EPOCH).unwrap();
        room.version = store.update(room.clone()).await.unwrap();
        assert_eq!(room.version, 1);

        let err = store.update(stale).await.unwrap_err();
        assert!(err.is_conflict());

        let stored = store.get(room.id).await.unwrap().unwrap();
        assert_eq!(stored, room);
    }

    #[tokio::test]
    async fn duplicate_ids_are_rejected() {
        let store = MemoryRoomStore::new();
        let room = room_at(GameId::Poker, 0);
        store.create(room.clone()).await.unwrap();
        assert!(store.create(room).await.is_err());
    }

    #[tokio::test]
    async fn updating_a_missing_room_is_not_found() {
        let store = MemoryRoomStore::new();
        let err = store.update(room_at(GameId::Poker, 0)).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn open_rooms_are_listed_oldest_first() {
        let store = MemoryRoomStore::new();
        let newer = room_at(GameId::ConnectFive, 20);
        let older = room_at(GameId::ConnectFive, 10);
        let other_game = room_at(GameId::Mastermind, 5);
        for room in [&newer, &older, &other_game] {
            store.create(room.clone()).await.unwrap();
        }

        let open = store.list_open_by_game(GameId::ConnectFive).await.unwrap();
        let ids: Vec<Uuid> = open.iter().map(|room| room.id).collect();
        assert_eq!(ids, vec![older.id, newer.id]);
    }

    #[tokio::test]
    async fn codes_resolve_only_while_the_room_is_live() {
        let store = MemoryRoomStore::new();
        let mut room = Room::new(
            GameId::Mastermind,
            Visibility::Private,
            Some("AB12".into()),
            "alice",
            SystemTime::UNIX_EPOCH,
        );
        store.create(room.clone()).await.unwrap();
        let found = store.find_by_code("AB12".into()).await.unwrap().unwrap();
        assert_eq!(found.id, room.id);

        room.advance(RoomStatus::Abandoned).unwrap();
        store.update(room).await.unwrap();
        assert!(store.find_by_code("AB12".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reaper_queries_respect_the_cutoff() {
        let store = MemoryRoomStore::new();
        let mut closed = room_at(GameId::Blackjack, 10);
        closed.advance(RoomStatus::Abandoned).unwrap();
        let waiting = room_at(GameId::Blackjack, 10);
        let recent = room_at(GameId::Blackjack, 100);
        for room in [&closed, &waiting, &recent] {
            store.create(room.clone()).await.unwrap();
        }

        let cutoff = SystemTime::UNIX_EPOCH + Duration::from_secs(50);
        let closed_ids: Vec<Uuid> = store
            .list_closed_before(cutoff)
            .await
            .unwrap()
            .iter()
            .map(|room| room.id)
            .collect();
        assert_eq!(closed_ids, vec![closed.id]);

        let waiting_ids: Vec<Uuid> = store
            .list_waiting_before(cutoff)
            .await
            .unwrap()
            .iter()
            .map(|room| room.id)
            .collect();
        assert_eq!(waiting_ids, vec![waiting.id]);

        assert!(store.delete(closed.id).await.unwrap());
        assert!(!store.delete(closed.id).await.unwrap());
        assert_eq!(store.len(), 2);
    }
}
