use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use common_auth::{AuthError, AuthResult};
use rand_core::OsRng;

/// One-way password hashing.
pub trait SecretHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> AuthResult<String>;

    /// Unparseable digests never verify.
    fn verify(&self, plaintext: &str, digest: &str) -> bool;
}

#[derive(Clone, Default)]
pub struct Argon2Hasher {
    argon2: Argon2<'static>,
}

impl Argon2Hasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Argon2id with explicit cost parameters (memory in KiB).
    pub fn with_params(memory_kib: u32, iterations: u32, parallelism: u32) -> AuthResult<Self> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|err| AuthError::Validation(format!("invalid argon2 parameters: {err}")))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }
}

impl SecretHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> AuthResult<String> {
        if plaintext.is_empty() {
            return Err(AuthError::Validation("Password must not be empty".into()));
        }

        let salt = SaltString::generate(&mut OsRng);
        self.argon2
            .hash_password(plaintext.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|err| AuthError::SigningError(format!("password hashing failed: {err}")))
    }

    fn verify(&self, plaintext: &str, digest: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(digest) else {
            return false;
        };
        self.argon2
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}
