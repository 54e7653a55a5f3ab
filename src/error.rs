use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;
use validator::ValidationErrors;

use crate::{
    client::phase::InvalidTransition,
    dao::storage::StorageError,
    engine::{EngineRejection, PlayerNumber},
};

/// Failures surfaced by matchmaking, the room controller and the session driver.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No room filled up within the configured wait.
    #[error("no match found before the search timed out")]
    SearchTimeout,
    /// The search was cancelled by the caller.
    #[error("the search was cancelled")]
    SearchCancelled,
    /// No open room matches the request.
    #[error("room not found")]
    RoomNotFound,
    /// Every seat of the room is taken.
    #[error("room {0} is full")]
    RoomFull(Uuid),
    /// The room code is malformed.
    #[error("invalid room code `{0}`")]
    InvalidCode(String),
    /// A local action was attempted by a seat that does not hold the turn.
    #[error("player {player} cannot act now (turn: {turn:?})")]
    NotYourTurn {
        /// Seat that tried to act.
        player: PlayerNumber,
        /// Seat holding the turn, if any.
        turn: Option<PlayerNumber>,
    },
    /// The session is not attached to a room topic.
    #[error("not connected to a room")]
    Disconnected,
    /// The engine refused the action.
    #[error("action rejected: {0}")]
    EngineRejected(#[from] EngineRejection),
    /// Resubscription kept failing past the retry budget.
    #[error("connection lost")]
    ConnectionLost,
    /// The controller was driven out of order.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),
    /// The room store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Operation exceeded its timeout limit.
    #[error("operation timed out")]
    Timeout,
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict { .. } => ServiceError::InvalidState(err.to_string()),
            StorageError::NotFound { id } => ServiceError::NotFound(format!("room {id}")),
            other => ServiceError::Unavailable(other),
        }
    }
}

impl From<SyncError> for ServiceError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::SearchTimeout => ServiceError::Timeout,
            SyncError::RoomNotFound => ServiceError::NotFound("room".into()),
            SyncError::InvalidCode(_) | SyncError::EngineRejected(_) => {
                ServiceError::InvalidInput(err.to_string())
            }
            SyncError::Storage(storage) => storage.into(),
            SyncError::SearchCancelled
            | SyncError::RoomFull(_)
            | SyncError::NotYourTurn { .. }
            | SyncError::Disconnected
            | SyncError::ConnectionLost
            | SyncError::InvalidTransition(_) => ServiceError::InvalidState(err.to_string()),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {0}")]
    Conflict(String),
    /// The request waited too long.
    #[error("timed out: {0}")]
    Timeout(String),
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(message) => AppError::BadRequest(message),
            ServiceError::InvalidState(message) => AppError::Conflict(message),
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::Timeout => AppError::Timeout("operation timed out".into()),
        }
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        ServiceError::from(err).into()
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
