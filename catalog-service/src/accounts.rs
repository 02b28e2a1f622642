use std::sync::{Arc, OnceLock};

use common_auth::{AuthError, AuthResult, IssuedToken, Role, TokenIssuer, TokenSubject};
use serde::Serialize;
use tracing::{info, warn};

use crate::credentials::{CredentialStore, Identity, NewIdentity};
use crate::hasher::SecretHasher;

const USERNAME_MIN: usize = 3;
const USERNAME_MAX: usize = 50;
const EMAIL_MAX: usize = 254;
const PASSWORD_MIN: usize = 3;
const PASSWORD_MAX: usize = 128;

const DECOY_PASSWORD: &str = "catalog-decoy-password";

#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<Role>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Availability {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username_available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_available: Option<bool>,
}

/// Register, login and password flows over a credential store.
pub struct AccountService {
    store: Arc<dyn CredentialStore>,
    hasher: Arc<dyn SecretHasher>,
    issuer: Arc<TokenIssuer>,
    decoy_hash: OnceLock<Option<String>>,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hasher: Arc<dyn SecretHasher>,
        issuer: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            store,
            hasher,
            issuer,
            decoy_hash: OnceLock::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Create an account. The store's unique constraints decide conflicts, so
    /// two concurrent registrations of one username yield exactly one winner.
    pub async fn register(&self, registration: Registration) -> AuthResult<Identity> {
        let username = validate_username(&registration.username)?;
        let email = normalize_email(&registration.email)?;
        validate_password(&registration.password)?;

        let password_hash = self.hasher.hash(&registration.password)?;
        let identity = self
            .store
            .insert(NewIdentity {
                username,
                email,
                password_hash,
                role: registration.role.unwrap_or_default(),
            })
            .await?;

        info!(username = %identity.username, role = %identity.role, "registered account");
        Ok(identity)
    }

    /// Every credential failure is `InvalidCredentials`; unknown usernames
    /// still run a hash verification.
    pub async fn login(&self, username: &str, password: &str) -> AuthResult<(Identity, IssuedToken)> {
        let record = self.store.find_by_username(username.trim()).await?;

        let identity = match record {
            Some(identity) if self.hasher.verify(password, &identity.password_hash) => identity,
            Some(identity) => {
                warn!(username = %identity.username, "login rejected: password mismatch");
                return Err(AuthError::InvalidCredentials);
            }
            None => {
                self.burn_decoy(password);
                warn!("login rejected: unknown account");
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self
            .issuer
            .issue(&TokenSubject::new(identity.username.clone(), identity.role))?;
        Ok((identity, token))
    }

    pub async fn change_password(
        &self,
        username: &str,
        current_password: &str,
        new_password: &str,
    ) -> AuthResult<()> {
        validate_password(new_password)?;

        let identity = self
            .store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !self.hasher.verify(current_password, &identity.password_hash) {
            warn!(username, "password change rejected: current password mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let new_hash = self.hasher.hash(new_password)?;
        let swapped = self
            .store
            .update_password(username, &identity.password_hash, &new_hash)
            .await?;
        if !swapped {
            warn!(username, "password change lost a concurrent update");
            return Err(AuthError::InvalidCredentials);
        }

        info!(username, "password changed");
        Ok(())
    }

    pub async fn profile(&self, username: &str) -> AuthResult<Identity> {
        self.store
            .find_by_username(username)
            .await?
            .ok_or(AuthError::Unauthenticated)
    }

    pub async fn update_email(&self, username: &str, email: &str) -> AuthResult<Identity> {
        let email = normalize_email(email)?;
        let mut identity = self.profile(username).await?;
        if identity.email == email {
            return Ok(identity);
        }
        identity.email = email;
        Ok(self.store.save(&identity).await?)
    }

    /// Returns `None` when no such account exists.
    pub async fn set_role(&self, username: &str, role: Role) -> AuthResult<Option<Identity>> {
        let Some(mut identity) = self.store.find_by_username(username).await? else {
            return Ok(None);
        };
        identity.role = role;
        let saved = self.store.save(&identity).await?;
        info!(username, role = %role, "role changed");
        Ok(Some(saved))
    }

    pub async fn delete(&self, username: &str) -> AuthResult<bool> {
        let removed = self.store.delete(username).await?;
        if removed {
            info!(username, "account deleted");
        }
        Ok(removed)
    }

    pub async fn list(&self) -> AuthResult<Vec<Identity>> {
        Ok(self.store.list().await?)
    }

    pub async fn availability(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<Availability> {
        let mut availability = Availability::default();
        if let Some(username) = username {
            availability.username_available =
                Some(!self.store.exists_by_username(username.trim()).await?);
        }
        if let Some(email) = email {
            let email = email.trim().to_ascii_lowercase();
            availability.email_available = Some(!self.store.exists_by_email(&email).await?);
        }
        Ok(availability)
    }

    /// Create an ADMIN account unless the username is already present.
    pub async fn ensure_admin(&self, username: &str, email: &str, password: &str) -> AuthResult<bool> {
        if self.store.exists_by_username(username).await? {
            return Ok(false);
        }
        match self
            .register(Registration {
                username: username.to_string(),
                email: email.to_string(),
                password: password.to_string(),
                role: Some(Role::Admin),
            })
            .await
        {
            Ok(_) => Ok(true),
            Err(AuthError::UsernameTaken) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn burn_decoy(&self, password: &str) {
        let decoy = self
            .decoy_hash
            .get_or_init(|| self.hasher.hash(DECOY_PASSWORD).ok());
        if let Some(digest) = decoy {
            let _ = self.hasher.verify(password, digest);
        }
    }
}

fn validate_username(raw: &str) -> AuthResult<String> {
    let username = raw.trim();
    let length = username.chars().count();
    if !(USERNAME_MIN..=USERNAME_MAX).contains(&length) {
        return Err(AuthError::Validation(format!(
            "Username must be between {USERNAME_MIN} and {USERNAME_MAX} characters"
        )));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(AuthError::Validation(
            "Username may only contain letters, digits, '_', '-' and '.'".into(),
        ));
    }
    Ok(username.to_string())
}

fn normalize_email(raw: &str) -> AuthResult<String> {
    let email = raw.trim().to_ascii_lowercase();
    let valid = email.len() <= EMAIL_MAX
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
    if !valid {
        return Err(AuthError::Validation("Email address is not valid".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> AuthResult<()> {
    let length = password.chars().count();
    if password.trim().is_empty() || !(PASSWORD_MIN..=PASSWORD_MAX).contains(&length) {
        return Err(AuthError::Validation(format!(
            "Password must be between {PASSWORD_MIN} and {PASSWORD_MAX} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::InMemoryCredentialStore;
    use crate::hasher::Argon2Hasher;
    use common_auth::{JwtConfig, SigningKey, TokenValidator};

    const SECRET: &[u8] = b"accounts-test-secret-0123456789abcdef";

    fn service() -> (AccountService, TokenValidator) {
        let key = Arc::new(SigningKey::from_secret(SECRET).expect("key"));
        let issuer = Arc::new(TokenIssuer::new(key.clone(), JwtConfig::new()));
        let hasher = Arc::new(Argon2Hasher::with_params(1024, 1, 1).expect("hasher"));
        let store = Arc::new(InMemoryCredentialStore::new());
        (
            AccountService::new(store, hasher, issuer),
            TokenValidator::new(key, JwtConfig::new()),
        )
    }

    fn registration(username: &str, email: &str, password: &str) -> Registration {
        Registration {
            username: username.into(),
            email: email.into(),
            password: password.into(),
            role: None,
        }
    }

    #[tokio::test]
    async fn alice_registers_logs_in_and_token_validates() {
        let (accounts, validator) = service();

        let alice = accounts
            .register(registration("alice", "a@x.com", "pw1"))
            .await
            .expect("register");
        assert_eq!(alice.role, Role::User);
        assert_ne!(alice.password_hash, "pw1");

        let err = accounts
            .register(registration("alice", "b@x.com", "pw2"))
            .await
            .expect_err("duplicate");
        assert_eq!(err, AuthError::UsernameTaken);

        assert_eq!(
            accounts.login("alice", "wrong").await.map(|_| ()),
            Err(AuthError::InvalidCredentials)
        );

        let (_, token) = accounts.login("alice", "pw1").await.expect("login");
        let claims = validator.validate(&token.token).expect("valid");
        assert_eq!(claims.subject, "alice");
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_are_indistinguishable() {
        let (accounts, _) = service();
        accounts
            .register(registration("carol", "c@x.com", "secret1"))
            .await
            .unwrap();

        let unknown = accounts.login("nobody", "secret1").await.map(|_| ());
        let mismatch = accounts.login("carol", "secret2").await.map(|_| ());
        assert_eq!(unknown, mismatch);
        assert_eq!(unknown, Err(AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn duplicate_email_is_reported_after_normalization() {
        let (accounts, _) = service();
        accounts
            .register(registration("dave", "Dave@X.com", "secret1"))
            .await
            .unwrap();
        let err = accounts
            .register(registration("dave2", " dave@x.com ", "secret1"))
            .await
            .expect_err("email taken");
        assert_eq!(err, AuthError::EmailTaken);
    }

    #[tokio::test]
    async fn invalid_input_commits_nothing() {
        let (accounts, _) = service();
        for bad in [
            registration("ab", "a@x.com", "secret1"),
            registration("has space", "a@x.com", "secret1"),
            registration("erin", "not-an-email", "secret1"),
            registration("erin", "a@x.com", "pw"),
        ] {
            assert!(matches!(
                accounts.register(bad).await,
                Err(AuthError::Validation(_))
            ));
        }
        assert!(accounts.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn change_password_requires_current_secret() {
        let (accounts, _) = service();
        accounts
            .register(registration("frank", "f@x.com", "first-pw"))
            .await
            .unwrap();

        assert_eq!(
            accounts.change_password("frank", "wrong-pw", "second-pw").await,
            Err(AuthError::InvalidCredentials)
        );
        accounts
            .change_password("frank", "first-pw", "second-pw")
            .await
            .expect("change");

        assert!(accounts.login("frank", "first-pw").await.is_err());
        assert!(accounts.login("frank", "second-pw").await.is_ok());
    }

    #[tokio::test]
    async fn set_role_and_seed_admin() {
        let (accounts, _) = service();
        assert!(accounts
            .ensure_admin("root", "root@x.com", "root-pw")
            .await
            .unwrap());
        assert!(!accounts
            .ensure_admin("root", "root@x.com", "root-pw")
            .await
            .unwrap());
        assert_eq!(accounts.profile("root").await.unwrap().role, Role::Admin);

        assert!(accounts.set_role("ghost", Role::Admin).await.unwrap().is_none());
        let demoted = accounts
            .set_role("root", Role::User)
            .await
            .unwrap()
            .expect("exists");
        assert_eq!(demoted.role, Role::User);
    }

    #[tokio::test]
    async fn availability_reflects_store() {
        let (accounts, _) = service();
        accounts
            .register(registration("gina", "g@x.com", "secret1"))
            .await
            .unwrap();

        let result = accounts
            .availability(Some("gina"), Some("G@X.com"))
            .await
            .unwrap();
        assert_eq!(result.username_available, Some(false));
        assert_eq!(result.email_available, Some(false));

        let result = accounts.availability(Some("henry"), None).await.unwrap();
        assert_eq!(result.username_available, Some(true));
        assert_eq!(result.email_available, None);
    }
}
