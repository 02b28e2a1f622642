use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Router,
};
use common_auth::{Role, SigningKey, TokenDenylist, TokenIssuer, TokenValidator};
use common_http_errors::{ApiError, ERROR_CODE_HEADER};
use common_security::{AccessPolicy, AccessRule, Requirement, RouteTable};

use crate::accounts::AccountService;
use crate::catalog::CatalogStore;
use crate::catalog_handlers as catalog;
use crate::config::ServiceConfig;
use crate::credentials::CredentialStore;
use crate::gate::{request_gate, RequestGate};
use crate::hasher::SecretHasher;
use crate::metrics::CatalogMetrics;
use crate::omdb::MetadataProvider;
use crate::user_handlers as users;

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<AccountService>,
    pub catalog: Arc<dyn CatalogStore>,
    pub provider: Arc<dyn MetadataProvider>,
    pub denylist: TokenDenylist,
    pub gate: RequestGate,
    pub metrics: Arc<CatalogMetrics>,
}

/// Storage and provider implementations chosen by the caller.
pub struct Collaborators {
    pub credentials: Arc<dyn CredentialStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub provider: Arc<dyn MetadataProvider>,
    pub hasher: Arc<dyn SecretHasher>,
}

/// Route requirements beyond the public table. Unlisted paths need any
/// authenticated caller.
pub fn access_rules() -> Vec<AccessRule> {
    vec![
        AccessRule::new("/api/admin", Requirement::Role(Role::Admin)),
        AccessRule::new("/api/user", Requirement::Role(Role::User)),
        AccessRule::new("/api/auth/logout", Requirement::AuthenticatedAny),
    ]
}

pub fn build_state(config: &ServiceConfig, parts: Collaborators) -> Result<AppState> {
    let key = Arc::new(
        SigningKey::from_secret(config.jwt_secret.as_bytes())
            .context("Failed to load signing key")?,
    );
    let issuer = Arc::new(TokenIssuer::new(key.clone(), config.jwt.clone()));
    let validator = Arc::new(TokenValidator::new(key, config.jwt.clone()));
    let policy = Arc::new(AccessPolicy::new(
        RouteTable::new(config.public_paths.iter().cloned()),
        access_rules(),
    ));
    let metrics = Arc::new(CatalogMetrics::new()?);
    let denylist = TokenDenylist::new();

    let gate = RequestGate::new(
        policy,
        validator,
        parts.credentials.clone(),
        denylist.clone(),
        metrics.clone(),
    )
    .with_lookup_timeout(config.store_timeout)
    .with_failure_mode(config.store_failure_mode);

    Ok(AppState {
        accounts: Arc::new(AccountService::new(
            parts.credentials,
            parts.hasher,
            issuer,
        )),
        catalog: parts.catalog,
        provider: parts.provider,
        denylist,
        gate,
        metrics,
    })
}

async fn health() -> &'static str {
    "ok"
}

async fn metrics_endpoint(State(state): State<AppState>) -> Response {
    match state.metrics.render() {
        Ok(response) => response,
        Err(err) => ApiError::internal(err).into_response(),
    }
}

async fn error_metrics_mw(
    State(metrics): State<Arc<CatalogMetrics>>,
    req: Request,
    next: Next,
) -> Response {
    let resp = next.run(req).await;
    let status = resp.status();
    if status.as_u16() >= 400 {
        let code = resp
            .headers()
            .get(ERROR_CODE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        metrics.http_error(code, status);
    }
    resp
}

pub fn build_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/movies", get(catalog::list_movies))
        .route("/movies/search", get(catalog::search_movies))
        .route("/movies/:id", get(catalog::get_movie))
        .route("/omdb/search", get(catalog::provider_search))
        .route("/omdb/details/:imdb_id", get(catalog::provider_details))
        .route("/omdb/title/:title", get(catalog::provider_details_by_title))
        .route("/users/available", get(users::availability));

    // Any signed-in caller, whatever the role.
    let movies = Router::new()
        .route("/", get(catalog::list_movies))
        .route("/search", get(catalog::search_movies))
        .route("/:id", get(catalog::get_movie))
        .route("/:id/rate", post(catalog::rate_movie));

    let user = Router::new()
        .route(
            "/profile",
            get(users::get_profile).put(users::update_profile),
        )
        .route("/password", post(users::change_password))
        .route("/movies", get(catalog::list_movies))
        .route("/movies/search", get(catalog::search_movies))
        .route("/movies/:id", get(catalog::get_movie))
        .route("/movies/:id/rate", post(catalog::rate_movie))
        .route("/movies/:id/rating", get(catalog::get_my_rating));

    let admin = Router::new()
        .route("/users", get(users::list_users))
        .route("/users/:username/role", put(users::change_role))
        .route("/users/:username", delete(users::delete_user))
        .route("/omdb/search", get(catalog::provider_search))
        .route("/omdb/details/:imdb_id", get(catalog::provider_details))
        .route("/movies", post(catalog::add_movie))
        .route(
            "/movies/batch",
            post(catalog::add_movies_batch).delete(catalog::remove_movies_batch),
        )
        .route("/movies/:id", delete(catalog::remove_movie));

    let auth = Router::new()
        .route("/register", post(users::register))
        .route("/login", post(users::login))
        .route("/logout", post(users::logout));

    Router::new()
        .route("/healthz", get(health))
        .route("/metrics", get(metrics_endpoint))
        .nest("/api/auth", auth)
        .nest("/api/public", public)
        .nest("/api/movies", movies)
        .nest("/api/user", user)
        .nest("/api/admin", admin)
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            request_gate,
        ))
        .layer(middleware::from_fn_with_state(
            state.metrics.clone(),
            error_metrics_mw,
        ))
        .with_state(state)
}
