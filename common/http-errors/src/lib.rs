use axum::{
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common_auth::AuthError;
use serde::Serialize;
use tracing::error;

pub const ERROR_CODE_HEADER: &str = "X-Error-Code";

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    BadRequest { code: &'static str, message: Option<String> },
    NotFound { code: &'static str, message: Option<String> },
    BadGateway { code: &'static str, message: Option<String> },
    Unavailable { code: &'static str },
    Internal,
}

impl ApiError {
    /// Logs the cause; the response body stays generic.
    pub fn internal<E: std::fmt::Display>(e: E) -> Self {
        error!(error = %e, "internal error");
        Self::Internal
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest { code, message: Some(message.into()) }
    }

    pub fn not_found(code: &'static str) -> Self {
        Self::NotFound { code, message: None }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        ApiError::Auth(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Auth(err) => return err.into_response(),
            ApiError::BadRequest { code, message } => (StatusCode::BAD_REQUEST, code, message),
            ApiError::NotFound { code, message } => (StatusCode::NOT_FOUND, code, message),
            ApiError::BadGateway { code, message } => (StatusCode::BAD_GATEWAY, code, message),
            ApiError::Unavailable { code } => (StatusCode::SERVICE_UNAVAILABLE, code, None),
            ApiError::Internal => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None),
        };
        let body = ErrorBody { code: code.into(), message };
        let mut resp = (status, Json(body)).into_response();
        if let Ok(val) = HeaderValue::from_str(code) {
            resp.headers_mut().insert(ERROR_CODE_HEADER, val);
        }
        resp
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.expect("body").to_bytes();
        serde_json::from_slice(&bytes).expect("json")
    }

    #[tokio::test]
    async fn not_found_sets_header_and_body() {
        let resp = ApiError::not_found("movie_not_found").into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "movie_not_found");
        let body = body_json(resp).await;
        assert_eq!(body["code"], "movie_not_found");
        assert!(body.get("message").is_none());
    }

    #[tokio::test]
    async fn internal_hides_cause() {
        let resp = ApiError::internal("connection reset by peer").into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(resp).await;
        assert_eq!(body["code"], "internal_error");
        assert!(!body.to_string().contains("connection reset"));
    }

    #[tokio::test]
    async fn auth_errors_keep_their_status() {
        let resp = ApiError::from(AuthError::EmailTaken).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(resp.headers().get(ERROR_CODE_HEADER).unwrap(), "email_taken");
    }
}
