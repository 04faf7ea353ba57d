//! Movie CRUD. Every write goes through the versioned update.

use axum::{
    extract::{
        rejection::{PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use serde::Deserialize;

use crate::data::filters::validate_filters;
use crate::data::movies::validate_movie;
use crate::data::{Filters, Movie, MovieFilter, StoreError, MOVIE_SORT_SAFELIST};
use crate::error::ApiError;
use crate::http::request::{read_id, JsonBody};
use crate::http::response::{envelope, message, paged};
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::resilience::bounded;
use crate::validator::Validator;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateMovieInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: i32,
    #[serde(default)]
    runtime: i32,
    #[serde(default)]
    genres: Vec<String>,
}

/// `POST /v1/movies`
pub async fn create(
    State(state): State<AppState>,
    JsonBody(input): JsonBody<CreateMovieInput>,
) -> Result<Response, ApiError> {
    let mut movie = Movie::new(input.title, input.year, input.runtime, input.genres);
    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    bounded(state.query_timeout(), state.models.movies.insert(&mut movie)).await?;

    let mut response = envelope(StatusCode::CREATED, "movie", &movie)?;
    if let Ok(location) = HeaderValue::from_str(&format!("/v1/movies/{}", movie.id)) {
        response.headers_mut().insert(header::LOCATION, location);
    }
    Ok(response)
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    title: Option<String>,
    /// Comma-separated.
    genres: Option<String>,
    page: Option<String>,
    page_size: Option<String>,
    sort: Option<String>,
}

/// `GET /v1/movies?title=..&genres=a,b&page=..&page_size=..&sort=..`
pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(query) = query.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let filter = MovieFilter {
        title: query.title.unwrap_or_default(),
        genres: query
            .genres
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|g| !g.is_empty())
            .map(str::to_string)
            .collect(),
    };

    let mut v = Validator::new();
    let mut filters = Filters::new(MOVIE_SORT_SAFELIST);
    filters.page = read_int(&mut v, "page", query.page.as_deref(), filters.page);
    filters.page_size = read_int(&mut v, "page_size", query.page_size.as_deref(), filters.page_size);
    if let Some(sort) = query.sort.filter(|s| !s.is_empty()) {
        filters.sort = sort;
    }
    validate_filters(&mut v, &filters);
    v.finish()?;

    let (movies, metadata) = bounded(
        state.query_timeout(),
        state.models.movies.get_all(&filter, &filters),
    )
    .await?;
    paged(StatusCode::OK, "movies", &movies, &metadata)
}

/// Integer query parameter, or `default` when absent. A value that does not
/// parse is recorded against `key` and the default is used.
fn read_int(v: &mut Validator, key: &str, raw: Option<&str>, default: i64) -> i64 {
    match raw.filter(|s| !s.is_empty()) {
        None => default,
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            v.add_error(key, "must be an integer value");
            default
        }),
    }
}

/// `GET /v1/movies/{id}`
pub async fn show(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = read_id(id)?;
    let movie = bounded(state.query_timeout(), state.models.movies.get(id)).await?;
    envelope(StatusCode::OK, "movie", &movie)
}

/// Partial update. `version` is the version the client last read.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateMovieInput {
    version: Option<i32>,
    title: Option<String>,
    year: Option<i32>,
    runtime: Option<i32>,
    genres: Option<Vec<String>>,
}

/// `PATCH /v1/movies/{id}`
pub async fn update(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
    JsonBody(input): JsonBody<UpdateMovieInput>,
) -> Result<Response, ApiError> {
    let id = read_id(id)?;
    let Some(expected_version) = input.version else {
        return Err(ApiError::field("version", "must be provided"));
    };

    let timeout = state.query_timeout();
    let mut movie = bounded(timeout, state.models.movies.get(id)).await?;

    if let Some(title) = input.title {
        movie.title = title;
    }
    if let Some(year) = input.year {
        movie.year = year;
    }
    if let Some(runtime) = input.runtime {
        movie.runtime = runtime;
    }
    if let Some(genres) = input.genres {
        movie.genres = genres;
    }

    let mut v = Validator::new();
    validate_movie(&mut v, &movie);
    v.finish()?;

    // The write is conditional on what the client saw, not on what we just read.
    movie.version = expected_version;
    if let Err(e) = bounded(timeout, state.models.movies.update(&mut movie)).await {
        if e == StoreError::EditConflict {
            tracing::info!(movie_id = id, expected_version, "Edit conflict on movie");
            metrics::record_edit_conflict("movie");
        }
        return Err(e.into());
    }

    envelope(StatusCode::OK, "movie", &movie)
}

/// `DELETE /v1/movies/{id}`
pub async fn delete(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> Result<Response, ApiError> {
    let id = read_id(id)?;
    bounded(state.query_timeout(), state.models.movies.delete(id)).await?;
    message(StatusCode::OK, "movie successfully deleted")
}
