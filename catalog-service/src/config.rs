use anyhow::{anyhow, bail, Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;

use common_auth::{JwtConfig, SigningKey};

use crate::gate::{StoreFailureMode, DEFAULT_LOOKUP_TIMEOUT};
use crate::omdb::DEFAULT_OMDB_BASE_URL;

pub const DEFAULT_PUBLIC_PATHS: &[&str] = &[
    "/api/public",
    "/api/auth/login",
    "/api/auth/register",
    "/healthz",
    "/metrics",
];

#[derive(Clone)]
pub struct AdminSeed {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("username", &self.username)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ServiceConfig {
    pub jwt_secret: String,
    pub jwt: JwtConfig,
    pub public_paths: Vec<String>,
    pub store_timeout: Duration,
    pub store_failure_mode: StoreFailureMode,
    pub default_admin: Option<AdminSeed>,
    pub database_url: Option<String>,
    pub run_migrations: bool,
    pub omdb_api_key: Option<String>,
    pub omdb_base_url: String,
    pub host: String,
    pub port: u16,
}

impl ServiceConfig {
    /// Defaults for everything except the signing secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            jwt_secret: jwt_secret.into(),
            jwt: JwtConfig::new(),
            public_paths: DEFAULT_PUBLIC_PATHS.iter().map(|p| p.to_string()).collect(),
            store_timeout: DEFAULT_LOOKUP_TIMEOUT,
            store_failure_mode: StoreFailureMode::Reject,
            default_admin: None,
            database_url: None,
            run_migrations: true,
            omdb_api_key: None,
            omdb_base_url: DEFAULT_OMDB_BASE_URL.to_string(),
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("jwt", &self.jwt)
            .field("public_paths", &self.public_paths)
            .field("store_timeout", &self.store_timeout)
            .field("store_failure_mode", &self.store_failure_mode)
            .field("default_admin", &self.default_admin)
            .field("database_configured", &self.database_url.is_some())
            .field("run_migrations", &self.run_migrations)
            .field("omdb_configured", &self.omdb_api_key.is_some())
            .field("omdb_base_url", &self.omdb_base_url)
            .field("host", &self.host)
            .field("port", &self.port)
            .finish_non_exhaustive()
    }
}

pub fn load_service_config() -> Result<ServiceConfig> {
    load_from(|key| env::var(key).ok())
}

/// Build the config from an arbitrary variable source.
pub fn load_from<F>(lookup: F) -> Result<ServiceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let jwt_secret = lookup("JWT_SECRET")
        .and_then(|value| normalize_optional(&value))
        .ok_or_else(|| anyhow!("JWT_SECRET must be set"))?;
    if jwt_secret.len() < SigningKey::MIN_SECRET_LEN {
        bail!(
            "JWT_SECRET must be at least {} bytes",
            SigningKey::MIN_SECRET_LEN
        );
    }

    let mut config = ServiceConfig::new(jwt_secret);

    if let Some(ttl) = parse_var::<i64, _>(&lookup, "AUTH_TOKEN_TTL_SECONDS")? {
        if ttl <= 0 {
            bail!("AUTH_TOKEN_TTL_SECONDS must be positive");
        }
        config.jwt = config.jwt.with_ttl(ttl);
    }
    if let Some(leeway) = parse_var::<u32, _>(&lookup, "AUTH_TOKEN_LEEWAY_SECONDS")? {
        config.jwt = config.jwt.with_leeway(leeway);
    }

    if let Some(paths) = lookup("AUTH_PUBLIC_PATHS") {
        config.public_paths = parse_list(&paths);
    }

    if let Some(millis) = parse_var::<u64, _>(&lookup, "AUTH_STORE_TIMEOUT_MS")? {
        config.store_timeout = Duration::from_millis(millis.max(1));
    }

    if let Some(mode) = lookup("AUTH_STORE_FAILURE_MODE").and_then(|v| normalize_optional(&v)) {
        config.store_failure_mode = mode
            .parse()
            .map_err(|err: String| anyhow!(err))
            .context("Failed to parse AUTH_STORE_FAILURE_MODE")?;
    }

    config.default_admin = admin_seed(&lookup)?;

    config.database_url = lookup("DATABASE_URL").and_then(|v| normalize_optional(&v));
    config.run_migrations = bool_from(&lookup, "DATABASE_RUN_MIGRATIONS").unwrap_or(true);

    config.omdb_api_key = lookup("OMDB_API_KEY").and_then(|v| normalize_optional(&v));
    if let Some(url) = lookup("OMDB_BASE_URL").and_then(|v| normalize_optional(&v)) {
        config.omdb_base_url = url;
    }

    if let Some(host) = lookup("HOST").and_then(|v| normalize_optional(&v)) {
        config.host = host;
    }
    if let Some(port) = parse_var::<u16, _>(&lookup, "PORT")? {
        config.port = port;
    }

    Ok(config)
}

fn admin_seed<F>(lookup: &F) -> Result<Option<AdminSeed>>
where
    F: Fn(&str) -> Option<String>,
{
    let username = lookup("AUTH_DEFAULT_ADMIN_USERNAME").and_then(|v| normalize_optional(&v));
    let password = lookup("AUTH_DEFAULT_ADMIN_PASSWORD").and_then(|v| normalize_optional(&v));
    let email = lookup("AUTH_DEFAULT_ADMIN_EMAIL").and_then(|v| normalize_optional(&v));

    match (username, password) {
        (Some(username), Some(password)) => {
            let email = email.unwrap_or_else(|| format!("{username}@localhost.localdomain"));
            Ok(Some(AdminSeed {
                username,
                email,
                password,
            }))
        }
        (None, None) => Ok(None),
        _ => bail!(
            "AUTH_DEFAULT_ADMIN_USERNAME and AUTH_DEFAULT_ADMIN_PASSWORD must be set together"
        ),
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).and_then(|value| normalize_optional(&value)) {
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|err| anyhow!("Invalid {key} '{value}': {err}")),
        None => Ok(None),
    }
}

fn bool_from<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).map(|value| {
        matches!(
            value.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split([',', ';', ' '])
        .filter_map(normalize_optional)
        .collect()
}

fn normalize_optional(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
