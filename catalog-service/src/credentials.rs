use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use serde::Serialize;
use uuid::Uuid;

use crate::error::StoreError;

/// A stored account. `username` never changes once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

/// Public view of an identity. Never carries the password hash.
#[derive(Debug, Clone, Serialize)]
pub struct UserView {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub authorities: Vec<&'static str>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Identity> for UserView {
    fn from(identity: &Identity) -> Self {
        Self {
            id: identity.id,
            username: identity.username.clone(),
            email: identity.email.clone(),
            role: identity.role,
            authorities: vec![identity.role.authority()],
            created_at: identity.created_at,
            updated_at: identity.updated_at,
        }
    }
}

/// Durable identity records. Uniqueness of username and email is enforced
/// by the store itself.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError>;

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError>;

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError>;

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError>;

    /// Persist email and role changes for an existing record.
    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError>;

    /// Replace the password hash only if it still equals `expected_hash`.
    /// Returns `false` when the record is gone or the hash has moved on.
    async fn update_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError>;

    async fn delete(&self, username: &str) -> Result<bool, StoreError>;

    async fn list(&self) -> Result<Vec<Identity>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    records: Mutex<HashMap<String, Identity>>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> std::sync::MutexGuard<'_, HashMap<String, Identity>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        Ok(self.records().get(username).cloned())
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.records().contains_key(username))
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.records().values().any(|record| record.email == email))
    }

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let mut records = self.records();
        if records.contains_key(&identity.username) {
            return Err(StoreError::DuplicateUsername);
        }
        if records.values().any(|record| record.email == identity.email) {
            return Err(StoreError::DuplicateEmail);
        }

        let now = Utc::now();
        let record = Identity {
            id: Uuid::new_v4(),
            username: identity.username,
            email: identity.email,
            password_hash: identity.password_hash,
            role: identity.role,
            created_at: now,
            updated_at: now,
        };
        records.insert(record.username.clone(), record.clone());
        Ok(record)
    }

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError> {
        let mut records = self.records();
        if records
            .values()
            .any(|record| record.email == identity.email && record.id != identity.id)
        {
            return Err(StoreError::DuplicateEmail);
        }

        let record = records
            .get_mut(&identity.username)
            .filter(|record| record.id == identity.id)
            .ok_or(StoreError::NotFound)?;
        record.email = identity.email.clone();
        record.role = identity.role;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn update_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let mut records = self.records();
        match records.get_mut(username) {
            Some(record) if record.password_hash == expected_hash => {
                record.password_hash = new_hash.to_string();
                record.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, username: &str) -> Result<bool, StoreError> {
        Ok(self.records().remove(username).is_some())
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let mut all: Vec<Identity> = self.records().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.username.cmp(&b.username)));
        Ok(all)
    }
}
