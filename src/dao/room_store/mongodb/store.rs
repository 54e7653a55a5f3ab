use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::{dial, ping},
    error::{MongoDaoError, MongoResult},
    models::{MongoRoomDocument, doc_id, doc_id_at},
};
use crate::{
    dao::{models::RoomEntity, room_store::RoomStore, storage::StorageResult},
    engine::GameId,
    state::room::{Room, RoomStatus},
};

const ROOM_COLLECTION_NAME: &str = "rooms";

/// Room store persisting rows in a MongoDB collection.
#[derive(Clone)]
pub struct MongoRoomStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        ping(&database)
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            dial(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRoomStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            dial(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.collection().await;

        let open_index = IndexModel::builder()
            .keys(doc! {"game": 1, "status": 1, "created_at": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_open_idx".to_owned()))
                    .build(),
            )
            .build();
        collection
            .create_index(open_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "game,status,created_at",
                source,
            })?;

        let code_index = IndexModel::builder()
            .keys(doc! {"code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("room_code_idx".to_owned()))
                    .sparse(Some(true))
                    .build(),
            )
            .build();
        collection
            .create_index(code_index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: ROOM_COLLECTION_NAME,
                index: "code",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoRoomDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<MongoRoomDocument>(ROOM_COLLECTION_NAME)
    }

    fn decode(document: MongoRoomDocument) -> StorageResult<Room> {
        let entity: RoomEntity = document.try_into()?;
        entity.into_room()
    }

    async fn find_many(&self, filter: Document) -> StorageResult<Vec<Room>> {
        let collection = self.collection().await;
        let documents: Vec<MongoRoomDocument> = collection
            .find(filter)
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::ListRooms { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRooms { source })?;

        documents.into_iter().map(Self::decode).collect()
    }

    async fn create(&self, room: Room) -> StorageResult<Uuid> {
        let id = room.id;
        let document: MongoRoomDocument = RoomEntity::from_room(&room)?.into();
        let collection = self.collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<Room>> {
        let collection = self.collection().await;
        let document = collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRoom { id, source })?;

        document.map(Self::decode).transpose()
    }

    async fn update(&self, room: Room) -> StorageResult<u64> {
        let id = room.id;
        let expected = room.version;
        let next = expected + 1;
        let document = MongoRoomDocument::from(RoomEntity::from_room(&room)?).with_version(next);
        let collection = self.collection().await;

        let result = collection
            .replace_one(doc_id_at(id, expected), &document)
            .await
            .map_err(|source| MongoDaoError::SaveRoom { id, source })?;

        if result.matched_count == 0 {
            let exists = collection
                .count_documents(doc_id(id))
                .await
                .map_err(|source| MongoDaoError::LoadRoom { id, source })?
                > 0;
            let err = if exists {
                MongoDaoError::VersionConflict { id, expected }
            } else {
                MongoDaoError::MissingRoom { id }
            };
            return Err(err.into());
        }

        Ok(next)
    }

    async fn delete(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteRoom { id, source })?;
        Ok(result.deleted_count > 0)
    }
}

fn closed_statuses() -> Vec<&'static str> {
    [RoomStatus::Finished, RoomStatus::Abandoned]
        .into_iter()
        .map(RoomStatus::as_str)
        .collect()
}

impl RoomStore for MongoRoomStore {
    fn create(&self, room: Room) -> BoxFuture<'static, StorageResult<Uuid>> {
        let store = self.clone();
        Box::pin(async move { store.create(room).await })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let store = self.clone();
        Box::pin(async move { store.get(id).await })
    }

    fn update(&self, room: Room) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.update(room).await })
    }

    fn find_by_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Room>>> {
        let store = self.clone();
        Box::pin(async move {
            let rooms = store
                .find_many(doc! {"code": code, "status": {"$nin": closed_statuses()}})
                .await?;
            Ok(rooms.into_iter().next())
        })
    }

    fn list_open_by_game(&self, game: GameId) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many(doc! {"game": game.as_str(), "status": RoomStatus::Waiting.as_str()})
                .await
        })
    }

    fn delete(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete(id).await.map_err(Into::into) })
    }

    fn list_closed_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many(doc! {
                    "status": {"$in": closed_statuses()},
                    "updated_at": {"$lt": DateTime::from_system_time(cutoff)},
                })
                .await
        })
    }

    fn list_waiting_before(
        &self,
        cutoff: SystemTime,
    ) -> BoxFuture<'static, StorageResult<Vec<Room>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many(doc! {
                    "status": RoomStatus::Waiting.as_str(),
                    "updated_at": {"$lt": DateTime::from_system_time(cutoff)},
                })
                .await
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
