use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};

/// Revoked token ids, kept until the token would have expired anyway.
#[derive(Debug, Clone, Default)]
pub struct TokenDenylist {
    inner: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl TokenDenylist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, token_id: impl Into<String>, expires_at: DateTime<Utc>) {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(token_id.into(), expires_at);
    }

    pub fn is_denied(&self, token_id: &str, now: DateTime<Utc>) -> bool {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        guard
            .get(token_id)
            .is_some_and(|expires_at| *expires_at >= now)
    }

    /// Drop entries whose tokens have expired. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.len();
        guard.retain(|_, expires_at| *expires_at >= now);
        before - guard.len()
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
