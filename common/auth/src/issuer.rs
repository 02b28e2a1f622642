use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::claims::{ClaimsRepr, TokenSubject};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::SigningKey;

/// A freshly signed bearer token.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub token_id: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub expires_in: i64,
}

#[derive(Debug, Clone)]
pub struct TokenIssuer {
    key: Arc<SigningKey>,
    config: JwtConfig,
}

impl TokenIssuer {
    pub fn new(key: Arc<SigningKey>, config: JwtConfig) -> Self {
        Self { key, config }
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    pub fn issue(&self, subject: &TokenSubject) -> AuthResult<IssuedToken> {
        self.issue_at(subject, Utc::now())
    }

    /// Sign a token as though the current time were `now`.
    pub fn issue_at(&self, subject: &TokenSubject, now: DateTime<Utc>) -> AuthResult<IssuedToken> {
        if subject.username.trim().is_empty() {
            return Err(AuthError::Validation("token subject must not be blank".into()));
        }

        // Claims carry whole seconds.
        let issued_at = Utc
            .timestamp_opt(now.timestamp(), 0)
            .single()
            .ok_or_else(|| AuthError::SigningError("issue time out of range".into()))?;
        let expires_at = issued_at + Duration::seconds(self.config.ttl_seconds);
        let token_id = Uuid::new_v4().to_string();

        let claims = ClaimsRepr {
            sub: Some(subject.username.clone()),
            role: Some(subject.role.as_str().to_string()),
            iat: Some(issued_at.timestamp()),
            exp: Some(expires_at.timestamp()),
            jti: Some(token_id.clone()),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, self.key.encoding())
            .map_err(|err| AuthError::SigningError(err.to_string()))?;

        debug!(subject = %subject.username, token_id = %token_id, "issued token");

        Ok(IssuedToken {
            token,
            token_type: "Bearer",
            token_id,
            issued_at,
            expires_at,
            expires_in: self.config.ttl_seconds,
        })
    }
}
