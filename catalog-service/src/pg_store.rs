use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common_auth::Role;
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use crate::catalog::{CatalogStore, Movie, Page, PageRequest, Rating};
use crate::credentials::{CredentialStore, Identity, NewIdentity};
use crate::error::StoreError;
use crate::omdb::MovieDetails;

const IDENTITY_COLUMNS: &str =
    "id, username, email, password_hash, role, created_at, updated_at";

const MOVIE_COLUMNS: &str = "id, imdb_id, title, year, poster_url, plot, director, actors, genre, \
     runtime, rated, released, writer, language, country, awards, imdb_rating, kind, added_by, created_at";

const RATING_COLUMNS: &str = "id, username, movie_id, rating, comment, created_at, updated_at";

#[derive(FromRow)]
struct IdentityRow {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<IdentityRow> for Identity {
    type Error = StoreError;

    fn try_from(row: IdentityRow) -> Result<Self, Self::Error> {
        let role = row.role.parse::<Role>().map_err(|err| {
            warn!(username = %row.username, error = %err, "stored role is not recognised");
            StoreError::Unavailable(err.to_string())
        })?;
        Ok(Identity {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Identity>, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Identity::try_from).transpose()
    }

    async fn exists_by_username(&self, username: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM identities WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn exists_by_email(&self, email: &str) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM identities WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn insert(&self, identity: NewIdentity) -> Result<Identity, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "INSERT INTO identities (id, username, email, password_hash, role)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&identity.username)
        .bind(&identity.email)
        .bind(&identity.password_hash)
        .bind(identity.role.as_str())
        .fetch_one(&self.pool)
        .await?;
        Identity::try_from(row)
    }

    async fn save(&self, identity: &Identity) -> Result<Identity, StoreError> {
        let row = sqlx::query_as::<_, IdentityRow>(&format!(
            "UPDATE identities SET email = $2, role = $3, updated_at = NOW()
             WHERE id = $1
             RETURNING {IDENTITY_COLUMNS}"
        ))
        .bind(identity.id)
        .bind(&identity.email)
        .bind(identity.role.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(StoreError::NotFound).and_then(Identity::try_from)
    }

    async fn update_password(
        &self,
        username: &str,
        expected_hash: &str,
        new_hash: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            "UPDATE identities SET password_hash = $3, updated_at = NOW()
             WHERE username = $1 AND password_hash = $2",
        )
        .bind(username)
        .bind(expected_hash)
        .bind(new_hash)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn delete(&self, username: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM identities WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Identity>, StoreError> {
        let rows = sqlx::query_as::<_, IdentityRow>(&format!(
            "SELECT {IDENTITY_COLUMNS} FROM identities ORDER BY created_at, username"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Identity::try_from).collect()
    }
}

#[derive(FromRow)]
struct MovieRow {
    id: i64,
    imdb_id: String,
    title: String,
    year: Option<String>,
    poster_url: Option<String>,
    plot: Option<String>,
    director: Option<String>,
    actors: Option<String>,
    genre: Option<String>,
    runtime: Option<String>,
    rated: Option<String>,
    released: Option<String>,
    writer: Option<String>,
    language: Option<String>,
    country: Option<String>,
    awards: Option<String>,
    imdb_rating: Option<String>,
    kind: Option<String>,
    added_by: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<MovieRow> for Movie {
    fn from(row: MovieRow) -> Self {
        Movie {
            id: row.id,
            imdb_id: row.imdb_id,
            title: row.title,
            year: row.year,
            poster_url: row.poster_url,
            plot: row.plot,
            director: row.director,
            actors: row.actors,
            genre: row.genre,
            runtime: row.runtime,
            rated: row.rated,
            released: row.released,
            writer: row.writer,
            language: row.language,
            country: row.country,
            awards: row.awards,
            imdb_rating: row.imdb_rating,
            kind: row.kind,
            added_by: row.added_by,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct RatingRow {
    id: i64,
    username: String,
    movie_id: i64,
    rating: i16,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<RatingRow> for Rating {
    fn from(row: RatingRow) -> Self {
        Rating {
            id: row.id,
            username: row.username,
            movie_id: row.movie_id,
            rating: row.rating,
            comment: row.comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// `%` and `_` in user input match literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .trim()
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

fn page_bounds(request: &PageRequest) -> (i64, i64) {
    let limit = i64::from(request.size);
    let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);
    (limit, offset)
}

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgCatalogStore {
    async fn list(&self, page: &PageRequest) -> Result<Page<Movie>, StoreError> {
        let (limit, offset) = page_bounds(page);
        // Sort column and direction come from closed enums.
        let sql = format!(
            "SELECT {MOVIE_COLUMNS} FROM movies ORDER BY {} {}, id ASC LIMIT $1 OFFSET $2",
            page.sort.column(),
            page.direction.keyword()
        );
        let rows = sqlx::query_as::<_, MovieRow>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies")
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(
            rows.into_iter().map(Movie::from).collect(),
            page,
            total.max(0) as u64,
        ))
    }

    async fn search(&self, title: &str, page: &PageRequest) -> Result<Page<Movie>, StoreError> {
        let (limit, offset) = page_bounds(page);
        let pattern = like_pattern(title);
        let rows = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE title ILIKE $1
             ORDER BY id ASC LIMIT $2 OFFSET $3"
        ))
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movies WHERE title ILIKE $1")
            .bind(&pattern)
            .fetch_one(&self.pool)
            .await?;
        Ok(Page::new(
            rows.into_iter().map(Movie::from).collect(),
            page,
            total.max(0) as u64,
        ))
    }

    async fn get(&self, id: i64) -> Result<Option<Movie>, StoreError> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Movie::from))
    }

    async fn find_by_imdb_id(&self, imdb_id: &str) -> Result<Option<Movie>, StoreError> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE imdb_id = $1"
        ))
        .bind(imdb_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Movie::from))
    }

    async fn add(&self, details: MovieDetails, added_by: &str) -> Result<Movie, StoreError> {
        let inserted = sqlx::query_as::<_, MovieRow>(&format!(
            "INSERT INTO movies (imdb_id, title, year, poster_url, plot, director, actors, genre,
                runtime, rated, released, writer, language, country, awards, imdb_rating, kind, added_by)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
             ON CONFLICT (imdb_id) DO NOTHING
             RETURNING {MOVIE_COLUMNS}"
        ))
        .bind(&details.imdb_id)
        .bind(&details.title)
        .bind(&details.year)
        .bind(&details.poster_url)
        .bind(&details.plot)
        .bind(&details.director)
        .bind(&details.actors)
        .bind(&details.genre)
        .bind(&details.runtime)
        .bind(&details.rated)
        .bind(&details.released)
        .bind(&details.writer)
        .bind(&details.language)
        .bind(&details.country)
        .bind(&details.awards)
        .bind(&details.imdb_rating)
        .bind(&details.kind)
        .bind(added_by)
        .fetch_optional(&self.pool)
        .await?;

        match inserted {
            Some(row) => Ok(row.into()),
            None => self
                .find_by_imdb_id(&details.imdb_id)
                .await?
                .ok_or(StoreError::NotFound),
        }
    }

    async fn remove(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_many(&self, ids: &[i64]) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM movies WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn rate(
        &self,
        username: &str,
        movie_id: i64,
        rating: i16,
        comment: Option<String>,
    ) -> Result<Option<Rating>, StoreError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "INSERT INTO ratings (username, movie_id, rating, comment)
             SELECT $1, m.id, $3, $4 FROM movies m WHERE m.id = $2
             ON CONFLICT (username, movie_id)
             DO UPDATE SET rating = EXCLUDED.rating, comment = EXCLUDED.comment, updated_at = NOW()
             RETURNING {RATING_COLUMNS}"
        ))
        .bind(username)
        .bind(movie_id)
        .bind(rating)
        .bind(comment)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Rating::from))
    }

    async fn rating_for(&self, username: &str, movie_id: i64) -> Result<Option<Rating>, StoreError> {
        let row = sqlx::query_as::<_, RatingRow>(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE username = $1 AND movie_id = $2"
        ))
        .bind(username)
        .bind(movie_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Rating::from))
    }

    async fn remove_ratings_by(&self, username: &str) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM ratings WHERE username = $1")
            .bind(username)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
