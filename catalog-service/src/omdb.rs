use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_OMDB_BASE_URL: &str = "https://www.omdbapi.com/";

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("metadata provider is not configured")]
    NotConfigured,
    #[error("metadata provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("metadata provider returned an error: {0}")]
    Upstream(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub imdb_id: String,
    pub title: String,
    pub year: Option<String>,
    pub poster_url: Option<String>,
    pub kind: Option<String>,
}

/// The movie fields the catalog keeps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MovieDetails {
    pub imdb_id: String,
    pub title: String,
    pub year: Option<String>,
    pub poster_url: Option<String>,
    pub plot: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub genre: Option<String>,
    pub runtime: Option<String>,
    pub rated: Option<String>,
    pub released: Option<String>,
    pub writer: Option<String>,
    pub language: Option<String>,
    pub country: Option<String>,
    pub awards: Option<String>,
    pub imdb_rating: Option<String>,
    pub kind: Option<String>,
}

#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn search(&self, title: &str, page: u32) -> Result<Vec<SearchHit>, ProviderError>;

    /// `None` when the provider has no entry for the id.
    async fn details(&self, imdb_id: &str) -> Result<Option<MovieDetails>, ProviderError>;

    /// Best match for an exact title, `None` when nothing matches.
    async fn details_by_title(&self, title: &str) -> Result<Option<MovieDetails>, ProviderError>;
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    #[serde(rename = "Search", default)]
    search: Vec<OmdbHit>,
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmdbHit {
    #[serde(rename = "imdbID")]
    imdb_id: String,
    #[serde(rename = "Title")]
    title: String,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "Poster")]
    poster: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmdbDetails {
    #[serde(rename = "imdbID")]
    imdb_id: Option<String>,
    #[serde(rename = "Title")]
    title: Option<String>,
    #[serde(rename = "Year")]
    year: Option<String>,
    #[serde(rename = "Poster")]
    poster: Option<String>,
    #[serde(rename = "Plot")]
    plot: Option<String>,
    #[serde(rename = "Director")]
    director: Option<String>,
    #[serde(rename = "Actors")]
    actors: Option<String>,
    #[serde(rename = "Genre")]
    genre: Option<String>,
    #[serde(rename = "Runtime")]
    runtime: Option<String>,
    #[serde(rename = "Rated")]
    rated: Option<String>,
    #[serde(rename = "Released")]
    released: Option<String>,
    #[serde(rename = "Writer")]
    writer: Option<String>,
    #[serde(rename = "Language")]
    language: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
    #[serde(rename = "Awards")]
    awards: Option<String>,
    #[serde(rename = "imdbRating")]
    imdb_rating: Option<String>,
    #[serde(rename = "Type")]
    kind: Option<String>,
    #[serde(rename = "Response")]
    response: String,
    #[serde(rename = "Error")]
    error: Option<String>,
}

/// OMDb reports missing values as the literal "N/A".
fn present(value: Option<String>) -> Option<String> {
    value.filter(|item| {
        let trimmed = item.trim();
        !trimmed.is_empty() && !trimmed.eq_ignore_ascii_case("N/A")
    })
}

fn is_true(flag: &str) -> bool {
    flag.eq_ignore_ascii_case("true")
}

impl OmdbDetails {
    fn into_details(self) -> Option<MovieDetails> {
        let imdb_id = present(self.imdb_id)?;
        let title = present(self.title)?;
        Some(MovieDetails {
            imdb_id,
            title,
            year: present(self.year),
            poster_url: present(self.poster),
            plot: present(self.plot),
            director: present(self.director),
            actors: present(self.actors),
            genre: present(self.genre),
            runtime: present(self.runtime),
            rated: present(self.rated),
            released: present(self.released),
            writer: present(self.writer),
            language: present(self.language),
            country: present(self.country),
            awards: present(self.awards),
            imdb_rating: present(self.imdb_rating),
            kind: present(self.kind),
        })
    }
}

#[derive(Clone)]
pub struct OmdbClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OmdbClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, ProviderError> {
        let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key,
        })
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::NotConfigured)
    }
}

#[async_trait]
impl MetadataProvider for OmdbClient {
    async fn search(&self, title: &str, page: u32) -> Result<Vec<SearchHit>, ProviderError> {
        let api_key = self.api_key()?;
        let page = page.max(1).to_string();
        let envelope: SearchEnvelope = self
            .http
            .get(&self.base_url)
            .query(&[
                ("apikey", api_key),
                ("s", title.trim()),
                ("type", "movie"),
                ("page", page.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !is_true(&envelope.response) {
            // "Movie not found!" and "Too many results." both mean an empty page.
            debug!(title, error = ?envelope.error, "metadata search returned no results");
            return Ok(Vec::new());
        }

        Ok(envelope
            .search
            .into_iter()
            .map(|hit| SearchHit {
                imdb_id: hit.imdb_id,
                title: hit.title,
                year: present(hit.year),
                poster_url: present(hit.poster),
                kind: present(hit.kind),
            })
            .collect())
    }

    async fn details(&self, imdb_id: &str) -> Result<Option<MovieDetails>, ProviderError> {
        self.fetch_details("i", imdb_id.trim()).await
    }

    async fn details_by_title(&self, title: &str) -> Result<Option<MovieDetails>, ProviderError> {
        self.fetch_details("t", title.trim()).await
    }
}

impl OmdbClient {
    /// Single-title lookup keyed by `i` (IMDb id) or `t` (title).
    async fn fetch_details(
        &self,
        key: &'static str,
        value: &str,
    ) -> Result<Option<MovieDetails>, ProviderError> {
        let api_key = self.api_key()?;
        let payload: OmdbDetails = self
            .http
            .get(&self.base_url)
            .query(&[("apikey", api_key), (key, value), ("plot", "full")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if !is_true(&payload.response) {
            let message = payload.error.unwrap_or_default();
            if is_missing(&message) {
                return Ok(None);
            }
            warn!(key, value, error = %message, "metadata provider rejected details lookup");
            return Err(ProviderError::Upstream(message));
        }

        Ok(payload.into_details())
    }
}

fn is_missing(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    message.contains("not found") || message.contains("incorrect imdb id")
}
