use std::fmt;

use jsonwebtoken::{DecodingKey, EncodingKey};

use crate::error::{AuthError, AuthResult};

/// Symmetric HS256 key shared by the issuer and the validator.
///
/// Loaded once at startup and read-only afterwards. Replacing the secret (and
/// restarting) invalidates every outstanding token.
#[derive(Clone)]
pub struct SigningKey {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKey {
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn from_secret(secret: &[u8]) -> AuthResult<Self> {
        if secret.len() < Self::MIN_SECRET_LEN {
            return Err(AuthError::SigningError(format!(
                "signing secret must be at least {} bytes",
                Self::MIN_SECRET_LEN
            )));
        }

        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        })
    }

    pub(crate) fn encoding(&self) -> &EncodingKey {
        &self.encoding
    }

    pub(crate) fn decoding(&self) -> &DecodingKey {
        &self.decoding
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(..)")
    }
}
