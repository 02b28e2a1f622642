use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::omdb::MovieDetails;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i64,
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
    pub added_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Movie {
    fn from_details(id: i64, details: MovieDetails, added_by: Option<String>) -> Self {
        Self {
            id,
            imdb_id: details.imdb_id,
            title: details.title,
            year: details.year,
            poster_url: details.poster_url,
            plot: details.plot,
            director: details.director,
            actors: details.actors,
            genre: details.genre,
            runtime: details.runtime,
            rated: details.rated,
            released: details.released,
            writer: details.writer,
            language: details.language,
            country: details.country,
            awards: details.awards,
            imdb_rating: details.imdb_rating,
            kind: details.kind,
            added_by,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rating {
    pub id: i64,
    pub username: String,
    pub movie_id: i64,
    pub rating: i16,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Title,
    Year,
    ImdbRating,
    CreatedAt,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::Title => "title",
            SortField::Year => "year",
            SortField::ImdbRating => "imdb_rating",
            SortField::CreatedAt => "created_at",
        }
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(SortField::Id),
            "title" => Ok(SortField::Title),
            "year" => Ok(SortField::Year),
            "imdb_rating" | "imdbrating" => Ok(SortField::ImdbRating),
            "created_at" | "createdat" => Ok(SortField::CreatedAt),
            other => Err(format!("cannot sort by '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    /// Anything other than `desc` sorts ascending.
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Zero-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub size: u32,
    pub sort: SortField,
    pub direction: SortDirection,
}

impl PageRequest {
    pub fn new(page: u32, size: u32) -> Self {
        Self {
            page,
            size: size.clamp(1, MAX_PAGE_SIZE),
            sort: SortField::Id,
            direction: SortDirection::Asc,
        }
    }

    pub fn sorted(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(0, DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, request: &PageRequest, total_elements: u64) -> Self {
        let size = u64::from(request.size.max(1));
        Self {
            content,
            page: request.page,
            size: request.size,
            total_elements,
            total_pages: total_elements.div_ceil(size),
        }
    }
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn list(&self, page: &PageRequest) -> Result<Page<Movie>, StoreError>;

    /// Case-insensitive title substring search.
    async fn search(&self, title: &str, page: &PageRequest) -> Result<Page<Movie>, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError>;

    async fn find_by_imdb_id(&self, imdb_id: &str) -> Result<Option<Movie>, StoreError>;

    /// Insert a movie; an existing entry with the same IMDb id is returned unchanged.
    async fn add(&self, details: MovieDetails, added_by: &str) -> Result<Movie, StoreError>;

    async fn remove(&self, id: i64) -> Result<bool, StoreError>;

    async fn remove_many(&self, ids: &[i64]) -> Result<u64, StoreError>;

    /// Upsert the caller's rating. `None` when the movie does not exist.
    async fn rate(
        &self,
        username: &str,
        movie_id: i64,
        rating: i16,
        comment: Option<String>,
    ) -> Result<Option<Rating>, StoreError>;

    async fn rating_for(&self, username: &str, movie_id: i64) -> Result<Option<Rating>, StoreError>;

    /// Drop every rating the user left. Returns how many were removed.
    async fn remove_ratings_by(&self, username: &str) -> Result<u64, StoreError>;
}

#[derive(Debug, Default)]
struct CatalogState {
    next_movie_id: i64,
    next_rating_id: i64,
    movies: BTreeMap<i64, Movie>,
    ratings: HashMap<(String, i64), Rating>,
}

#[derive(Debug, Default)]
pub struct InMemoryCatalogStore {
    state: Mutex<CatalogState>,
}

impl InMemoryCatalogStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, CatalogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn paginate(mut movies: Vec<Movie>, request: &PageRequest) -> Page<Movie> {
        movies.sort_by(|a, b| {
            let ordering = match request.sort {
                SortField::Id => a.id.cmp(&b.id),
                SortField::Title => a.title.cmp(&b.title),
                SortField::Year => a.year.cmp(&b.year),
                SortField::ImdbRating => a.imdb_rating.cmp(&b.imdb_rating),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            };
            match request.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });

        let total = movies.len() as u64;
        let content = movies
            .into_iter()
            .skip(usize::try_from(request.offset()).unwrap_or(usize::MAX))
            .take(request.size as usize)
            .collect();
        Page::new(content, request, total)
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalogStore {
    async fn list(&self, page: &PageRequest) -> Result<Page<Movie>, StoreError> {
        let movies = self.state().movies.values().cloned().collect();
        Ok(Self::paginate(movies, page))
    }

    async fn search(&self, title: &str, page: &PageRequest) -> Result<Page<Movie>, StoreError> {
        let needle = title.trim().to_lowercase();
        let movies = self
            .state()
            .movies
            .values()
            .filter(|movie| movie.title.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        Ok(Self::paginate(movies, page))
    }

    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        Ok(self.state().movies.get(&id).cloned())
    }

    async fn find_by_imdb_id(&self, imdb_id: &str) -> Result<Option<Movie>, StoreError> {
        Ok(self
            .state()
            .movies
            .values()
            .find(|movie| movie.imdb_id == imdb_id)
            .cloned())
    }

    async fn add(&self, details: MovieDetails, added_by: &str) -> Result<Movie, StoreError> {
        let mut state = self.state();
        if let Some(existing) = state
            .movies
            .values()
            .find(|movie| movie.imdb_id == details.imdb_id)
        {
            return Ok(existing.clone());
        }

        state.next_movie_id += 1;
        let movie = Movie::from_details(state.next_movie_id, details, Some(added_by.to_string()));
        state.movies.insert(movie.id, movie.clone());
        Ok(movie)
    }

    async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let mut state = self.state();
        let removed = state.movies.remove(&id).is_some();
        state.ratings.retain(|(_, movie_id), _| *movie_id != id);
        Ok(removed)
    }

    async fn remove_many(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let mut state = self.state();
        let mut removed = 0;
        for id in ids {
            if state.movies.remove(id).is_some() {
                removed += 1;
            }
        }
        state.ratings.retain(|(_, movie_id), _| !ids.contains(movie_id));
        Ok(removed)
    }

    async fn rate(
        &self,
        username: &str,
        movie_id: i64,
        rating: i16,
        comment: Option<String>,
    ) -> Result<Option<Rating>, StoreError> {
        let mut state = self.state();
        if !state.movies.contains_key(&movie_id) {
            return Ok(None);
        }

        let now = Utc::now();
        let key = (username.to_string(), movie_id);
        if let Some(existing) = state.ratings.get_mut(&key) {
            existing.rating = rating;
            existing.comment = comment;
            existing.updated_at = now;
            return Ok(Some(existing.clone()));
        }

        state.next_rating_id += 1;
        let created = Rating {
            id: state.next_rating_id,
            username: username.to_string(),
            movie_id,
            rating,
            comment,
            created_at: now,
            updated_at: now,
        };
        state.ratings.insert(key, created.clone());
        Ok(Some(created))
    }

    async fn rating_for(&self, username: &str, movie_id: i64) -> Result<Option<Rating>, StoreError> {
        Ok(self
            .state()
            .ratings
            .get(&(username.to_string(), movie_id))
            .cloned())
    }

    async fn remove_ratings_by(&self, username: &str) -> Result<u64, StoreError> {
        let mut state = self.state();
        let before = state.ratings.len();
        state.ratings.retain(|(rater, _), _| rater != username);
        Ok((before - state.ratings.len()) as u64)
    }
}
