use axum::http::{
    header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Method,
};
use catalog_service::catalog::{CatalogStore, InMemoryCatalogStore};
use catalog_service::config::load_service_config;
use catalog_service::credentials::{CredentialStore, InMemoryCredentialStore};
use catalog_service::hasher::Argon2Hasher;
use catalog_service::omdb::OmdbClient;
use catalog_service::pg_store::{PgCatalogStore, PgCredentialStore};
use catalog_service::{build_router, build_state, Collaborators};
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

const DENYLIST_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let config = load_service_config()?;
    info!(?config, "loaded configuration");

    let (credentials, catalog) = match config.database_url.as_deref() {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .acquire_timeout(config.store_timeout)
                .connect(url)
                .await?;
            if config.run_migrations {
                sqlx::migrate!("./migrations").run(&pool).await?;
            }
            let credentials: Arc<dyn CredentialStore> =
                Arc::new(PgCredentialStore::new(pool.clone()));
            let catalog: Arc<dyn CatalogStore> = Arc::new(PgCatalogStore::new(pool));
            (credentials, catalog)
        }
        None => {
            warn!("DATABASE_URL not set; accounts and movies are kept in memory");
            let credentials: Arc<dyn CredentialStore> = Arc::new(InMemoryCredentialStore::new());
            let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new());
            (credentials, catalog)
        }
    };

    let provider = Arc::new(OmdbClient::new(
        config.omdb_base_url.clone(),
        config.omdb_api_key.clone(),
    )?);

    let state = build_state(
        &config,
        Collaborators {
            credentials,
            catalog,
            provider,
            hasher: Arc::new(Argon2Hasher::new()),
        },
    )?;

    if let Some(seed) = &config.default_admin {
        if state
            .accounts
            .ensure_admin(&seed.username, &seed.email, &seed.password)
            .await?
        {
            info!(username = %seed.username, "seeded default admin account");
        }
    }

    let denylist = state.denylist.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(DENYLIST_PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            let purged = denylist.purge_expired(Utc::now());
            if purged > 0 {
                info!(purged, "purged expired denylist entries");
            }
        }
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([ACCEPT, CONTENT_TYPE, AUTHORIZATION]);

    let app = build_router(state).layer(cors);

    let ip: std::net::IpAddr = config.host.parse()?;
    let addr = SocketAddr::from((ip, config.port));
    info!(%addr, "starting catalog-service");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
