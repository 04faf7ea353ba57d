//! Movies: the versioned business resource exposed by the API.

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use super::filters::{Filters, Metadata};
use super::versioned::Versioned;
use super::StoreError;
use crate::validator::{unique, Validator};

#[derive(Debug, Clone, Serialize)]
pub struct Movie {
    pub id: i64,
    #[serde(skip)]
    pub created_at: DateTime<Utc>,
    pub title: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub year: i32,
    #[serde(skip_serializing_if = "is_zero")]
    pub runtime: i32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub genres: Vec<String>,
    pub version: i32,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

impl Movie {
    pub fn new(title: String, year: i32, runtime: i32, genres: Vec<String>) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            title,
            year,
            runtime,
            genres,
            version: 1,
        }
    }
}

impl Versioned for Movie {
    fn id(&self) -> i64 {
        self.id
    }
    fn version(&self) -> i32 {
        self.version
    }
    fn set_version(&mut self, version: i32) {
        self.version = version;
    }
}

pub fn validate_movie(v: &mut Validator, movie: &Movie) {
    v.check(!movie.title.is_empty(), "title", "must be provided");
    v.check(movie.title.len() <= 500, "title", "must not be more than 500 bytes long");

    v.check(movie.year != 0, "year", "must be provided");
    v.check(movie.year >= 1888, "year", "must be greater than 1888");
    v.check(movie.year <= Utc::now().year(), "year", "must not be in the future");

    v.check(movie.runtime != 0, "runtime", "must be provided");
    v.check(movie.runtime > 0, "runtime", "must be a positive integer");

    v.check(!movie.genres.is_empty(), "genres", "must contain at least 1 genre");
    v.check(movie.genres.len() <= 5, "genres", "must not contain more than 5 genres");
    v.check(unique(&movie.genres), "genres", "must not contain duplicate values");
}

/// Title words and genres a listing must match; empty means "any".
#[derive(Debug, Clone, Default)]
pub struct MovieFilter {
    pub title: String,
    pub genres: Vec<String>,
}

impl MovieFilter {
    pub fn matches(&self, movie: &Movie) -> bool {
        let title = movie.title.to_lowercase();
        let words: Vec<&str> = title.split_whitespace().collect();
        let title_ok = self
            .title
            .to_lowercase()
            .split_whitespace()
            .all(|w| words.contains(&w));
        let genres_ok = self.genres.iter().all(|g| movie.genres.contains(g));
        title_ok && genres_ok
    }
}

pub const MOVIE_SORT_SAFELIST: &[&str] = &[
    "id", "title", "year", "runtime", "-id", "-title", "-year", "-runtime",
];

/// Order two movies by the sort key in `filters`, breaking ties on id
/// ascending so pages are stable.
pub fn compare_movies(a: &Movie, b: &Movie, filters: &Filters) -> Ordering {
    let by_column = match filters.sort_column() {
        "title" => a.title.cmp(&b.title),
        "year" => a.year.cmp(&b.year),
        "runtime" => a.runtime.cmp(&b.runtime),
        _ => a.id.cmp(&b.id),
    };
    let by_column = if filters.descending() {
        by_column.reverse()
    } else {
        by_column
    };
    by_column.then(a.id.cmp(&b.id))
}

#[async_trait]
pub trait MovieStore: Send + Sync {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError>;
    async fn get(&self, id: i64) -> Result<Movie, StoreError>;
    /// One page of matching movies, sorted per `filters`.
    async fn get_all(
        &self,
        filter: &MovieFilter,
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError>;
    /// Conditional on `movie.version`; bumps it on success.
    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError>;
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
}
