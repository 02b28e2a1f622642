use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, decode_header, Algorithm, Validation};
use tracing::debug;

use crate::claims::{Claims, ClaimsRepr};
use crate::config::JwtConfig;
use crate::error::{AuthError, AuthResult};
use crate::keys::SigningKey;

/// Verifies bearer tokens signed by [`crate::TokenIssuer`].
///
/// Checks run in a fixed order and stop at the first failure: structure,
/// signature, expiry, then required claims. A token whose signature fails is
/// never reported as expired.
#[derive(Debug, Clone)]
pub struct TokenValidator {
    key: Arc<SigningKey>,
    config: JwtConfig,
    validation: Validation,
}

impl TokenValidator {
    pub fn new(key: Arc<SigningKey>, config: JwtConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry and presence checks are applied below against an injectable clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            key,
            config,
            validation,
        }
    }

    pub fn validate(&self, token: &str) -> AuthResult<Claims> {
        self.validate_at(token, Utc::now())
    }

    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> AuthResult<Claims> {
        check_structure(token)?;

        let data = decode::<ClaimsRepr>(token, self.key.decoding(), &self.validation)
            .map_err(classify)?;
        let repr = data.claims;

        let exp = repr.exp.ok_or(AuthError::MissingClaims)?;
        if now.timestamp() > exp.saturating_add(i64::from(self.config.leeway_seconds)) {
            return Err(AuthError::Expired);
        }

        let claims = Claims::try_from(repr)?;
        debug!(subject = %claims.subject, "validated token");
        Ok(claims)
    }
}

fn check_structure(token: &str) -> AuthResult<()> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 || segments.iter().any(|segment| segment.is_empty()) {
        return Err(AuthError::Malformed);
    }
    decode_header(token).map_err(|_| AuthError::Malformed)?;
    URL_SAFE_NO_PAD
        .decode(segments[1])
        .map_err(|_| AuthError::Malformed)?;
    Ok(())
}

fn classify(err: JwtError) -> AuthError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => AuthError::BadSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::MissingRequiredClaim(_) => AuthError::MissingClaims,
        _ => AuthError::Malformed,
    }
}
