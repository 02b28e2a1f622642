use common_auth::AuthError;
use common_http_errors::ApiError;
use thiserror::Error;
use tracing::error;

/// Failures reported by the credential and catalog stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("username already exists")]
    DuplicateUsername,
    #[error("email already exists")]
    DuplicateEmail,
    #[error("record not found")]
    NotFound,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateUsername => AuthError::UsernameTaken,
            StoreError::DuplicateEmail => AuthError::EmailTaken,
            StoreError::NotFound => AuthError::Unauthenticated,
            StoreError::Unavailable(detail) => AuthError::StoreUnavailable(detail),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => ApiError::not_found("not_found"),
            StoreError::Unavailable(detail) => {
                error!(error = %detail, "store call failed");
                ApiError::Unavailable {
                    code: "store_unavailable",
                }
            }
            other => ApiError::Auth(other.into()),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                return match db.constraint() {
                    Some(constraint) if constraint.contains("email") => StoreError::DuplicateEmail,
                    _ => StoreError::DuplicateUsername,
                };
            }
        }
        StoreError::Unavailable(err.to_string())
    }
}
