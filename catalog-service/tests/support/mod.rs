#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::http::{header::AUTHORIZATION, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use catalog_service::catalog::InMemoryCatalogStore;
use catalog_service::config::ServiceConfig;
use catalog_service::credentials::{CredentialStore, Identity, InMemoryCredentialStore, NewIdentity};
use catalog_service::error::StoreError;
use catalog_service::hasher::Argon2Hasher;
use catalog_service::omdb::{MetadataProvider, MovieDetails, ProviderError, SearchHit};
use catalog_service::{build_router, build_state, AppState, Collaborators};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

pub const TEST_SECRET: &str = "catalog-integration-secret-0123456789abcdef";

pub fn test_config() -> ServiceConfig {
    ServiceConfig::new(TEST_SECRET)
}

/// Metadata provider backed by a fixed table.
#[derive(Default)]
pub struct StubProvider {
    movies: HashMap<String, MovieDetails>,
}

impl StubProvider {
    pub fn with_movies(titles: &[(&str, &str)]) -> Self {
        let movies = titles
            .iter()
            .map(|(imdb_id, title)| {
                (
                    imdb_id.to_string(),
                    MovieDetails {
                        imdb_id: imdb_id.to_string(),
                        title: title.to_string(),
                        year: Some("1999".into()),
                        kind: Some("movie".into()),
                        ..MovieDetails::default()
                    },
                )
            })
            .collect();
        Self { movies }
    }
}

#[async_trait]
impl MetadataProvider for StubProvider {
    async fn search(&self, title: &str, _page: u32) -> Result<Vec<SearchHit>, ProviderError> {
        let needle = title.to_lowercase();
        let mut hits: Vec<SearchHit> = self
            .movies
            .values()
            .filter(|movie| movie.title.to_lowercase().contains(&needle))
            .map(|movie| SearchHit {
                imdb_id: movie.imdb_id.clone(),
                title: movie.title.clone(),
                year: movie.year.clone(),
                poster_url: None,
                kind: movie.kind.clone(),
            })
            .collect();
        hits.sort_by(|a, b| a.imdb_id.cmp(&b.imdb_id));
        Ok(hits)
    }

    async fn details(&self, imdb_id: &str) -> Result<Option<MovieDetails>, ProviderError> {
        Ok(self.movies.get(imdb_id).cloned())
    }

    async fn details_by_title(&self, title: &str) -> Result<Option<MovieDetails>, ProviderError> {
        Ok(self
            .movies
            .values()
            .find(|movie| movie.title.eq_ignore_ascii_case(title.trim()))
            .cloned())
    }
}

/// Credential store whose lookups can be made slow or failing on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryCredentialStore,
    slow: AtomicBool,
    failing: AtomicBool,
}

impl FlakyStore {
    pub fn set_slow(&self, slow: bool) {
        self.slow.store(slow, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    async fn disturb(&self) -> Result<(), StoreError> {
        if self.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FlakyStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        self.disturb().await?;
        self.inner.find_by_username(username).await
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        self.inner.exists_by_username(username).await
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        self.inner.exists_by_email(email).await
    }

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        self.inner.insert(identity).await
    }

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError> {
        self.inner.save(identity).await
    }

    async fn update_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        self.inner
            .update_password(username, expected_hash, new_hash)
            .await
    }

    async fn delete(&self, username: &str) -> Result<bool, StoreError> {
        self.inner.delete(username).await
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        self.inner.list().await
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<FlakyStore>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("json body")
    }

    pub fn error_code(&self) -> Option<&str> {
        self.headers
            .get("X-Error-Code")
            .and_then(|value| value.to_str().ok())
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let store = Arc::new(FlakyStore::default());
        let provider = StubProvider::with_movies(&[
            ("tt0133093", "The Matrix"),
            ("tt0234215", "The Matrix Reloaded"),
            ("tt0120737", "The Lord of the Rings"),
        ]);
        let state = build_state(
            &config,
            Collaborators {
                credentials: store.clone(),
                catalog: Arc::new(InMemoryCatalogStore::new()),
                provider: Arc::new(provider),
                hasher: Arc::new(Argon2Hasher::with_params(8, 1, 1).expect("hasher params")),
            },
        )
        .expect("state");
        Self {
            router: build_router(state.clone()),
            state,
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("body")
            .to_bytes();
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> TestResponse {
        self.send(Method::GET, uri, token, None).await
    }

    pub async fn register(&self, username: &str, email: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "username": username,
                "email": email,
                "password": password,
            })),
        )
        .await
    }

    pub async fn login(&self, username: &str, password: &str) -> TestResponse {
        self.send(
            Method::POST,
            "/api/auth/login",
            None,
            Some(serde_json::json!({ "username": username, "password": password })),
        )
        .await
    }

    /// Register then log in, returning the bearer token.
    pub async fn user_token(&self, username: &str, password: &str) -> String {
        let registered = self
            .register(username, &format!("{username}@example.com"), password)
            .await;
        assert_eq!(registered.status, StatusCode::CREATED, "register {username}");
        self.token_for(username, password).await
    }

    pub async fn admin_token(&self, username: &str, password: &str) -> String {
        let created = self
            .state
            .accounts
            .ensure_admin(username, &format!("{username}@example.com"), password)
            .await
            .expect("seed admin");
        assert!(created, "admin {username} already existed");
        self.token_for(username, password).await
    }

    pub async fn token_for(&self, username: &str, password: &str) -> String {
        let response = self.login(username, password).await;
        assert_eq!(response.status, StatusCode::OK, "login {username}");
        response.json()["token"]
            .as_str()
            .expect("token field")
            .to_string()
    }
}
