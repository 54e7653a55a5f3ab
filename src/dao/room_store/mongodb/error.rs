use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

/// Result of a MongoDB room store call.
pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failures of the MongoDB room store.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    /// A required setting was absent from the environment.
    #[error("environment variable `{var}` is not set")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The connection string could not be parsed.
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        /// URI as configured.
        uri: String,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The driver refused the client options.
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The server never answered while dialing.
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        /// Pings sent before giving up.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: MongoError,
    },
    /// A health check ping failed on an established client.
    #[error("MongoDB ping health check failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// Index creation failed at startup.
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        /// Collection the index belongs to.
        collection: &'static str,
        /// Index name.
        index: &'static str,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A room insert or replace failed.
    #[error("failed to save room `{id}`")]
    SaveRoom {
        /// Room being written.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A room lookup failed.
    #[error("failed to load room `{id}`")]
    LoadRoom {
        /// Room being read.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A room delete failed.
    #[error("failed to delete room `{id}`")]
    DeleteRoom {
        /// Room being deleted.
        id: Uuid,
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// A room scan failed.
    #[error("failed to list rooms")]
    ListRooms {
        /// Driver error.
        #[source]
        source: MongoError,
    },
    /// The stored version no longer matches the one the writer read.
    #[error("room `{id}` moved past version {expected}")]
    VersionConflict {
        /// Room being written.
        id: Uuid,
        /// Version the writer expected.
        expected: u64,
    },
    /// The room vanished before the write landed.
    #[error("room `{id}` does not exist")]
    MissingRoom {
        /// Room being written.
        id: Uuid,
    },
    /// A stored document did not decode into a room.
    #[error("room `{id}` holds a malformed document: {message}")]
    MalformedDocument {
        /// Room whose document is broken.
        id: Uuid,
        /// Decoder message.
        message: String,
    },
}
