use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use common_http_errors::{ApiError, ApiResult};
use common_security::{CurrentIdentity, RequireAdmin};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::{
    Movie, Page, PageRequest, Rating, SortDirection, SortField, DEFAULT_PAGE_SIZE,
};
use crate::omdb::{MovieDetails, ProviderError, SearchHit};
use crate::AppState;

const MAX_BATCH: usize = 50;

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::NotConfigured => ApiError::Unavailable {
                code: "metadata_provider_not_configured",
            },
            other => {
                warn!(error = %other, "metadata provider call failed");
                ApiError::BadGateway {
                    code: "metadata_provider_error",
                    message: Some("The movie metadata provider could not be reached".into()),
                }
            }
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub sort_by: Option<String>,
    pub direction: Option<String>,
}

impl ListQuery {
    fn page_request(&self) -> ApiResult<PageRequest> {
        let sort = match self.sort_by.as_deref() {
            Some(raw) => raw
                .parse::<SortField>()
                .map_err(|err| ApiError::bad_request("invalid_sort", err))?,
            None => SortField::default(),
        };
        let direction = self
            .direction
            .as_deref()
            .map(SortDirection::parse)
            .unwrap_or_default();
        Ok(PageRequest::new(
            self.page.unwrap_or(0),
            self.size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .sorted(sort, direction))
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub title: String,
    pub page: Option<u32>,
    pub size: Option<u32>,
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Movie>>> {
    let request = query.page_request()?;
    Ok(Json(state.catalog.list(&request).await?))
}

pub async fn search_movies(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<Page<Movie>>> {
    if query.title.trim().is_empty() {
        return Err(ApiError::bad_request("missing_title", "A title is required"));
    }
    let request = PageRequest::new(query.page.unwrap_or(0), query.size.unwrap_or(DEFAULT_PAGE_SIZE));
    Ok(Json(state.catalog.search(&query.title, &request).await?))
}

pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Movie>> {
    state
        .catalog
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("movie_not_found"))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i16,
    pub comment: Option<String>,
}

pub async fn rate_movie(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<i64>,
    Json(request): Json<RateRequest>,
) -> ApiResult<Json<Rating>> {
    if !(1..=5).contains(&request.rating) {
        return Err(ApiError::bad_request(
            "invalid_rating",
            "Rating must be between 1 and 5",
        ));
    }
    let comment = request
        .comment
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty());

    let rating = state
        .catalog
        .rate(&identity.username, id, request.rating, comment)
        .await?
        .ok_or_else(|| ApiError::not_found("movie_not_found"))?;
    Ok(Json(rating))
}

pub async fn get_my_rating(
    State(state): State<AppState>,
    CurrentIdentity(identity): CurrentIdentity,
    Path(id): Path<i64>,
) -> ApiResult<Json<Rating>> {
    state
        .catalog
        .rating_for(&identity.username, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("rating_not_found"))
}

#[derive(Debug, Deserialize)]
pub struct ProviderSearchQuery {
    pub title: String,
    pub page: Option<u32>,
}

pub async fn provider_search(
    State(state): State<AppState>,
    Query(query): Query<ProviderSearchQuery>,
) -> ApiResult<Json<Vec<SearchHit>>> {
    if query.title.trim().is_empty() {
        return Err(ApiError::bad_request("missing_title", "A title is required"));
    }
    let hits = state
        .provider
        .search(&query.title, query.page.unwrap_or(1))
        .await?;
    Ok(Json(hits))
}

pub async fn provider_details(
    State(state): State<AppState>,
    Path(imdb_id): Path<String>,
) -> ApiResult<Json<MovieDetails>> {
    state
        .provider
        .details(&imdb_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("movie_not_found"))
}

pub async fn provider_details_by_title(
    State(state): State<AppState>,
    Path(title): Path<String>,
) -> ApiResult<Json<MovieDetails>> {
    if title.trim().is_empty() {
        return Err(ApiError::bad_request("missing_title", "A title is required"));
    }
    state
        .provider
        .details_by_title(&title)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("movie_not_found"))
}

#[derive(Debug, Deserialize)]
pub struct AddMovieRequest {
    #[serde(alias = "imdbId")]
    pub imdb_id: String,
}

async fn add_one(state: &AppState, imdb_id: &str, admin: &str) -> ApiResult<Movie> {
    let imdb_id = imdb_id.trim();
    if imdb_id.is_empty() {
        return Err(ApiError::bad_request("missing_imdb_id", "An IMDb id is required"));
    }
    if let Some(existing) = state.catalog.find_by_imdb_id(imdb_id).await? {
        return Ok(existing);
    }

    let details = state
        .provider
        .details(imdb_id)
        .await?
        .ok_or_else(|| ApiError::NotFound {
            code: "movie_not_found",
            message: Some(format!("No metadata found for {imdb_id}")),
        })?;
    let movie = state.catalog.add(details, admin).await?;
    info!(admin, imdb_id, movie_id = movie.id, "movie added to catalog");
    Ok(movie)
}

pub async fn add_movie(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(request): Json<AddMovieRequest>,
) -> ApiResult<Json<Movie>> {
    Ok(Json(add_one(&state, &request.imdb_id, &admin.username).await?))
}

/// Adds in order and stops at the first failure; earlier additions remain.
pub async fn add_movies_batch(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(imdb_ids): Json<Vec<String>>,
) -> ApiResult<Json<Vec<Movie>>> {
    validate_batch(imdb_ids.len())?;
    let mut added = Vec::with_capacity(imdb_ids.len());
    for imdb_id in &imdb_ids {
        added.push(add_one(&state, imdb_id, &admin.username).await?);
    }
    Ok(Json(added))
}

pub async fn remove_movie(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    if !state.catalog.remove(id).await? {
        return Err(ApiError::not_found("movie_not_found"));
    }
    info!(admin = %admin.username, movie_id = id, "movie removed from catalog");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Serialize)]
pub struct RemovedResponse {
    pub removed: u64,
}

pub async fn remove_movies_batch(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    Json(ids): Json<Vec<i64>>,
) -> ApiResult<Json<RemovedResponse>> {
    validate_batch(ids.len())?;
    let removed = state.catalog.remove_many(&ids).await?;
    info!(admin = %admin.username, requested = ids.len(), removed, "movies removed in batch");
    Ok(Json(RemovedResponse { removed }))
}

fn validate_batch(len: usize) -> ApiResult<()> {
    if len == 0 {
        return Err(ApiError::bad_request("empty_batch", "At least one id is required"));
    }
    if len > MAX_BATCH {
        return Err(ApiError::bad_request(
            "batch_too_large",
            format!("At most {MAX_BATCH} ids per batch"),
        ));
    }
    Ok(())
}
