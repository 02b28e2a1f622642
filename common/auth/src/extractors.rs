use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, HeaderValue};

use crate::error::{AuthError, AuthResult};

/// Bearer token from the `Authorization` header, if one was sent.
///
/// A header that is present but not a usable bearer credential is `Malformed`.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<Option<String>> {
    match headers.get(AUTHORIZATION) {
        Some(value) => parse_bearer(value).map(Some),
        None => Ok(None),
    }
}

fn parse_bearer(value: &HeaderValue) -> AuthResult<String> {
    let raw = value.to_str().map_err(|_| AuthError::Malformed)?.trim();

    let token = raw
        .strip_prefix("Bearer ")
        .ok_or(AuthError::Malformed)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::Malformed);
    }

    Ok(token.to_owned())
}
