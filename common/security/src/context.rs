use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Utc};
use serde::Serialize;

use common_auth::{AuthError, Role};

/// The caller behind a request, resolved from a valid token and the live
/// credential record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthenticatedIdentity {
    pub username: String,
    pub role: Role,
    pub token_id: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
}

impl AuthenticatedIdentity {
    pub fn new(username: impl Into<String>, role: Role) -> Self {
        Self {
            username: username.into(),
            role,
            token_id: None,
            token_expires_at: None,
        }
    }

    pub fn authorities(&self) -> Vec<&'static str> {
        vec![self.role.authority()]
    }

    pub fn has_role(&self, required: Role) -> bool {
        self.role.satisfies(required)
    }
}

/// Request-scoped identity, stored in the request extensions by the gate and
/// dropped with the request.
#[derive(Debug, Clone, Default)]
pub struct IdentityContext {
    identity: Option<AuthenticatedIdentity>,
}

impl IdentityContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: AuthenticatedIdentity) -> Self {
        Self {
            identity: Some(identity),
        }
    }

    pub fn identity(&self) -> Option<&AuthenticatedIdentity> {
        self.identity.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some()
    }
}

fn context_from_parts(parts: &Parts) -> Option<AuthenticatedIdentity> {
    parts
        .extensions
        .get::<IdentityContext>()
        .and_then(|ctx| ctx.identity.clone())
}

/// Requires an authenticated caller.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub AuthenticatedIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        context_from_parts(parts)
            .map(CurrentIdentity)
            .ok_or(AuthError::Unauthenticated)
    }
}

/// The caller if there is one; public handlers use this.
#[derive(Debug, Clone)]
pub struct MaybeIdentity(pub Option<AuthenticatedIdentity>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeIdentity
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeIdentity(context_from_parts(parts)))
    }
}

#[derive(Debug, Clone)]
pub struct RequireAdmin(pub AuthenticatedIdentity);

#[async_trait]
impl<S> FromRequestParts<S> for RequireAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let identity = context_from_parts(parts).ok_or(AuthError::Unauthenticated)?;
        crate::policy::ensure_role(&identity, Role::Admin)?;
        Ok(RequireAdmin(identity))
    }
}
