use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use crate::roles::Role;

pub type AuthResult<T> = Result<T, AuthError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token is malformed")]
    Malformed,
    #[error("token signature is invalid")]
    BadSignature,
    #[error("token has expired")]
    Expired,
    #[error("token is missing required claims")]
    MissingClaims,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient role, {required} required")]
    Forbidden { required: Role },
    #[error("username is already taken")]
    UsernameTaken,
    #[error("email is already in use")]
    EmailTaken,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("token signing failed: {0}")]
    SigningError(String),
    #[error("credential store unavailable: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// Token-level failures; the request gate downgrades these to an anonymous caller.
    pub fn is_token_error(&self) -> bool {
        matches!(
            self,
            AuthError::Malformed
                | AuthError::BadSignature
                | AuthError::Expired
                | AuthError::MissingClaims
        )
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Malformed
            | AuthError::BadSignature
            | AuthError::Expired
            | AuthError::MissingClaims
            | AuthError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden { .. } => StatusCode::FORBIDDEN,
            AuthError::UsernameTaken
            | AuthError::EmailTaken
            | AuthError::InvalidCredentials
            | AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::SigningError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AuthError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Malformed => "token_malformed",
            AuthError::BadSignature => "token_bad_signature",
            AuthError::Expired => "token_expired",
            AuthError::MissingClaims => "token_missing_claims",
            AuthError::Unauthenticated => "unauthenticated",
            AuthError::Forbidden { .. } => "forbidden",
            AuthError::UsernameTaken => "username_taken",
            AuthError::EmailTaken => "email_taken",
            AuthError::InvalidCredentials => "invalid_credentials",
            AuthError::Validation(_) => "validation_failed",
            AuthError::SigningError(_) => "signing_error",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }

    fn public_message(&self) -> String {
        match self {
            AuthError::SigningError(_) => "Unable to issue authentication token.".to_string(),
            AuthError::StoreUnavailable(_) => {
                "Authentication is temporarily unavailable. Please retry.".to_string()
            }
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = self.code();
        let body = ErrorBody {
            code,
            message: self.public_message(),
        };

        let mut response = (status, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert("X-Error-Code", HeaderValue::from_static(code));
        if status == StatusCode::UNAUTHORIZED {
            headers.insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_error_classes() {
        for err in [
            AuthError::Malformed,
            AuthError::BadSignature,
            AuthError::Expired,
            AuthError::MissingClaims,
            AuthError::Unauthenticated,
        ] {
            assert_eq!(err.status(), StatusCode::UNAUTHORIZED, "{err:?}");
        }
        assert_eq!(
            AuthError::Forbidden {
                required: Role::Admin
            }
            .status(),
            StatusCode::FORBIDDEN
        );
        for err in [
            AuthError::UsernameTaken,
            AuthError::EmailTaken,
            AuthError::InvalidCredentials,
        ] {
            assert_eq!(err.status(), StatusCode::BAD_REQUEST, "{err:?}");
        }
        assert_eq!(
            AuthError::StoreUnavailable("timeout".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn infrastructure_detail_is_not_rendered() {
        let response = AuthError::StoreUnavailable("pg: connection refused".into()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("X-Error-Code").unwrap(),
            "store_unavailable"
        );
        assert!(AuthError::StoreUnavailable("x".into())
            .public_message()
            .contains("temporarily unavailable"));
    }

    #[test]
    fn unauthorized_responses_carry_bearer_challenge() {
        let response = AuthError::Unauthenticated.into_response();
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
}
