use std::error::Error;
use thiserror::Error;
use uuid::Uuid;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by storage backends regardless of the underlying database.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or failed mid-call.
    #[error("storage unavailable: {message}")]
    Unavailable {
        /// Backend message.
        message: String,
        /// Backend error.
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    /// Compare-and-swap write lost against a newer version.
    #[error("room {id} is no longer at version {expected}")]
    VersionConflict {
        /// Room being written.
        id: Uuid,
        /// Version the writer read.
        expected: u64,
    },
    /// The room is not stored.
    #[error("room {id} does not exist")]
    NotFound {
        /// Missing room.
        id: Uuid,
    },
    /// A stored record could not be decoded back into a room.
    #[error("room {id} is corrupt: {message}")]
    Corrupt {
        /// Room whose record is broken.
        id: Uuid,
        /// Decoder message.
        message: String,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Whether the failure is a lost compare-and-swap race.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }
}
