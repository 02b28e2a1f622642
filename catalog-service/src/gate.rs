use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use common_auth::{bearer_token, AuthError, AuthResult, TokenDenylist, TokenValidator};
use common_security::{AccessPolicy, AuthenticatedIdentity, IdentityContext};
use tracing::{debug, warn};

use crate::credentials::CredentialStore;
use crate::metrics::CatalogMetrics;

pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(2000);

/// What the gate does when the live identity lookup fails or times out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreFailureMode {
    /// Answer 503.
    #[default]
    Reject,
    /// Continue as an anonymous caller.
    Anonymous,
}

impl FromStr for StoreFailureMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(StoreFailureMode::Reject),
            "anonymous" => Ok(StoreFailureMode::Anonymous),
            other => Err(format!(
                "unsupported store failure mode '{other}', use reject or anonymous"
            )),
        }
    }
}

/// Resolves the caller of every request and enforces the access policy.
#[derive(Clone)]
pub struct RequestGate {
    policy: Arc<AccessPolicy>,
    validator: Arc<TokenValidator>,
    store: Arc<dyn CredentialStore>,
    denylist: TokenDenylist,
    metrics: Arc<CatalogMetrics>,
    lookup_timeout: Duration,
    failure_mode: StoreFailureMode,
}

impl RequestGate {
    pub fn new(
        policy: Arc<AccessPolicy>,
        validator: Arc<TokenValidator>,
        store: Arc<dyn CredentialStore>,
        denylist: TokenDenylist,
        metrics: Arc<CatalogMetrics>,
    ) -> Self {
        Self {
            policy,
            validator,
            store,
            denylist,
            metrics,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            failure_mode: StoreFailureMode::default(),
        }
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    pub fn with_failure_mode(mut self, mode: StoreFailureMode) -> Self {
        self.failure_mode = mode;
        self
    }

    /// Resolve the identity behind a request without applying the policy.
    ///
    /// Public paths are never inspected. Token problems downgrade the caller
    /// to anonymous; only a failing credential store is an error.
    pub async fn resolve(&self, path: &str, headers: &HeaderMap) -> AuthResult<IdentityContext> {
        if self.policy.route_table().is_public(path) {
            self.metrics.gate_outcome("public");
            return Ok(IdentityContext::anonymous());
        }

        let token = match bearer_token(headers) {
            Ok(Some(token)) => token,
            Ok(None) => {
                self.metrics.gate_outcome("anonymous");
                return Ok(IdentityContext::anonymous());
            }
            Err(err) => {
                debug!(path, class = err.code(), "ignoring unusable authorization header");
                self.metrics.gate_outcome(err.code());
                return Ok(IdentityContext::anonymous());
            }
        };

        let claims = match self.validator.validate(&token) {
            Ok(claims) => claims,
            Err(err) => {
                warn!(path, class = err.code(), "bearer token rejected");
                self.metrics.gate_outcome(err.code());
                return Ok(IdentityContext::anonymous());
            }
        };

        if let Some(token_id) = claims.token_id.as_deref() {
            if self.denylist.is_denied(token_id, Utc::now()) {
                debug!(path, subject = %claims.subject, "token has been revoked");
                self.metrics.gate_outcome("token_revoked");
                return Ok(IdentityContext::anonymous());
            }
        }

        let lookup =
            tokio::time::timeout(self.lookup_timeout, self.store.find_by_username(&claims.subject))
                .await;
        let record = match lookup {
            Ok(Ok(record)) => record,
            Ok(Err(err)) => return self.store_failure(path, err.to_string()),
            Err(_) => return self.store_failure(path, "identity lookup timed out".to_string()),
        };

        let Some(record) = record else {
            debug!(path, subject = %claims.subject, "token subject no longer exists");
            self.metrics.gate_outcome("unknown_subject");
            return Ok(IdentityContext::anonymous());
        };

        if record.role != claims.role {
            debug!(
                username = %record.username,
                token_role = %claims.role,
                live_role = %record.role,
                "live role differs from token"
            );
        }

        self.metrics.gate_outcome("authenticated");
        Ok(IdentityContext::authenticated(AuthenticatedIdentity {
            username: record.username,
            role: record.role,
            token_id: claims.token_id,
            token_expires_at: Some(claims.expires_at),
        }))
    }

    /// Resolve the caller, then apply the access policy for `path`.
    pub async fn authorize(&self, path: &str, headers: &HeaderMap) -> AuthResult<IdentityContext> {
        let context = self.resolve(path, headers).await?;
        if let Err(err) = self.policy.evaluate(path, context.identity()) {
            self.metrics.gate_outcome(err.code());
            return Err(err);
        }
        Ok(context)
    }

    fn store_failure(&self, path: &str, detail: String) -> AuthResult<IdentityContext> {
        self.metrics.gate_outcome("store_unavailable");
        match self.failure_mode {
            StoreFailureMode::Reject => {
                warn!(path, error = %detail, "identity lookup failed, rejecting request");
                Err(AuthError::StoreUnavailable(detail))
            }
            StoreFailureMode::Anonymous => {
                warn!(path, error = %detail, "identity lookup failed, continuing anonymously");
                Ok(IdentityContext::anonymous())
            }
        }
    }
}

/// Middleware entry point. The identity context travels in the request
/// extensions and is dropped with the request.
pub async fn request_gate(State(gate): State<RequestGate>, mut req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    match gate.authorize(&path, req.headers()).await {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(err) => err.into_response(),
    }
}
