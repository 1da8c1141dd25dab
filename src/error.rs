use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// IdentityError
///
/// Failures reported by (or while talking to) the hosted identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The provider answered but refused the request (bad credentials, expired code, ...).
    /// Carries the provider's own message, which is safe to show to the user.
    #[error("{0}")]
    Rejected(String),
    /// The provider could not be reached or answered with something unreadable.
    #[error("identity provider unavailable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for IdentityError {
    fn from(err: reqwest::Error) -> Self {
        IdentityError::Transport(err.to_string())
    }
}

/// StoreError
///
/// Failures of the table-oriented data store. No partial write is assumed after any of them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("{0}")]
    Conflict(String),
    #[error("the '{0}' role is reserved and cannot be changed or deleted")]
    ReservedRole(String),
    #[error("role '{0}' does not exist")]
    UnknownRole(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                tracing::debug!("unique violation: {}", db.message());
                StoreError::Conflict(conflict_message(db.constraint()).to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// The user-facing text of a unique violation, chosen by constraint name. Postgres' own message
/// names the constraint and is kept out of responses.
pub fn conflict_message(constraint: Option<&str>) -> &'static str {
    match constraint {
        Some(name) if name.starts_with("users_") => "A user with that email already exists",
        Some(name) if name.starts_with("roles_") => "A role with that name already exists",
        _ => "A record with that name already exists",
    }
}

/// StorageError
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("could not presign upload: {0}")]
    Presign(String),
}

/// ConsoleError
///
/// The error type returned by every handler. Each variant is converted into a status code and a
/// short user-facing message at the boundary of the action that triggered it.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("invalid credentials: {0}")]
    SignIn(IdentityError),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// ErrorBody
///
/// JSON body of every error response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    pub error: String,
}

impl ConsoleError {
    pub fn status(&self) -> StatusCode {
        match self {
            ConsoleError::Unauthorized => StatusCode::UNAUTHORIZED,
            ConsoleError::Forbidden(_) => StatusCode::FORBIDDEN,
            ConsoleError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ConsoleError::SignIn(IdentityError::Rejected(_)) => StatusCode::UNAUTHORIZED,
            ConsoleError::SignIn(IdentityError::Transport(_)) => StatusCode::BAD_GATEWAY,
            ConsoleError::Identity(IdentityError::Rejected(_)) => StatusCode::BAD_REQUEST,
            ConsoleError::Identity(IdentityError::Transport(_)) => StatusCode::BAD_GATEWAY,
            ConsoleError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            ConsoleError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ConsoleError::Store(StoreError::ReservedRole(_)) => StatusCode::CONFLICT,
            ConsoleError::Store(StoreError::UnknownRole(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            ConsoleError::Store(StoreError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ConsoleError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message shown to the user. Infrastructure details stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            ConsoleError::SignIn(IdentityError::Rejected(msg))
            | ConsoleError::Identity(IdentityError::Rejected(msg)) => msg.clone(),
            ConsoleError::SignIn(IdentityError::Transport(_))
            | ConsoleError::Identity(IdentityError::Transport(_)) => {
                "The sign-in service is unavailable. Please try again.".to_string()
            }
            ConsoleError::Store(StoreError::Database(_)) => {
                "An unexpected error occurred".to_string()
            }
            ConsoleError::Storage(_) => "Failed to prepare the upload".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ConsoleError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, status = %status, "request rejected");
        }
        (
            status,
            Json(ErrorBody {
                error: self.user_message(),
            }),
        )
            .into_response()
    }
}
