mod config;
mod connection;
mod error;
mod models;
/// Store implementation over the `rooms` collection.
pub mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoRoomStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::VersionConflict { id, expected } => {
                StorageError::VersionConflict { id, expected }
            }
            MongoDaoError::MissingRoom { id } => StorageError::NotFound { id },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
