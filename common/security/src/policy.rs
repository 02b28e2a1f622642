use tracing::warn;

use common_auth::{AuthError, AuthResult, Role};

use crate::context::AuthenticatedIdentity;
use crate::routes::{path_matches, RouteTable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    Public,
    AuthenticatedAny,
    Role(Role),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessRule {
    pub pattern: String,
    pub requirement: Requirement,
}

impl AccessRule {
    pub fn new(pattern: impl Into<String>, requirement: Requirement) -> Self {
        Self {
            pattern: pattern.into(),
            requirement,
        }
    }
}

/// Route pattern to requirement table.
///
/// The public route table is consulted first. Otherwise the longest matching
/// pattern decides, and unmatched paths require any authenticated caller.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    public: RouteTable,
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(public: RouteTable, rules: Vec<AccessRule>) -> Self {
        Self { public, rules }
    }

    pub fn route_table(&self) -> &RouteTable {
        &self.public
    }

    pub fn requirement_for(&self, path: &str) -> Requirement {
        if self.public.is_public(path) {
            return Requirement::Public;
        }

        self.rules
            .iter()
            .filter(|rule| path_matches(&rule.pattern, path))
            .max_by_key(|rule| rule.pattern.trim_end_matches('/').len())
            .map(|rule| rule.requirement)
            .unwrap_or(Requirement::AuthenticatedAny)
    }

    pub fn evaluate(&self, path: &str, identity: Option<&AuthenticatedIdentity>) -> AuthResult<()> {
        match (self.requirement_for(path), identity) {
            (Requirement::Public, _) => Ok(()),
            (_, None) => {
                warn!(path, "access_denied_unauthenticated");
                Err(AuthError::Unauthenticated)
            }
            (Requirement::AuthenticatedAny, Some(_)) => Ok(()),
            (Requirement::Role(required), Some(identity)) => ensure_role(identity, required),
        }
    }
}

pub fn ensure_role(identity: &AuthenticatedIdentity, required: Role) -> AuthResult<()> {
    if identity.role.satisfies(required) {
        return Ok(());
    }
    warn!(username = %identity.username, %required, role = %identity.role, "role_check_failed");
    Err(AuthError::Forbidden { required })
}
