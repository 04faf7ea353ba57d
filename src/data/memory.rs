//! In-process backend implementing every store trait.
//!
//! Users and movies live in [`VersionedTable`]s so updates go through the
//! same conditional write a SQL backend would issue. Emails are unique
//! case-insensitively; the email index lock is always taken before a row
//! lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::filters::{paginate, Filters, Metadata};
use super::movies::{compare_movies, Movie, MovieFilter, MovieStore};
use super::permissions::{PermissionStore, Permissions};
use super::tokens::{Scope, Token, TokenHash, TokenStore};
use super::users::{User, UserStore};
use super::versioned::VersionedTable;
use super::StoreError;

/// What survives of a token once issued.
#[derive(Debug, Clone)]
struct StoredToken {
    user_id: i64,
    expiry: DateTime<Utc>,
    scope: Scope,
}

#[derive(Default)]
pub struct MemoryStore {
    users: VersionedTable<User>,
    emails: Mutex<HashMap<String, i64>>,
    tokens: DashMap<TokenHash, StoredToken>,
    permissions: DashMap<i64, Permissions>,
    movies: VersionedTable<Movie>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn emails(&self) -> MutexGuard<'_, HashMap<String, i64>> {
        self.emails.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of tokens currently held, expired ones included.
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn insert(&self, user: &mut User) -> Result<(), StoreError> {
        let key = user.email.to_lowercase();
        let mut emails = self.emails();
        if emails.contains_key(&key) {
            return Err(StoreError::DuplicateEmail);
        }

        user.id = self.users.next_id();
        user.created_at = Utc::now();
        user.version = 1;
        emails.insert(key, user.id);
        self.users.insert(user.clone());
        Ok(())
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let id = self
            .emails()
            .get(&email.to_lowercase())
            .copied()
            .ok_or(StoreError::NotFound)?;
        self.users.get(id).ok_or(StoreError::NotFound)
    }

    async fn get_for_token(
        &self,
        scope: Scope,
        token_hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError> {
        let user_id = self
            .tokens
            .get(token_hash)
            .filter(|t| t.scope == scope && t.expiry > now)
            .map(|t| t.user_id)
            .ok_or(StoreError::NotFound)?;
        self.users.get(user_id).ok_or(StoreError::NotFound)
    }

    async fn update(&self, user: &mut User) -> Result<(), StoreError> {
        let key = user.email.to_lowercase();
        let mut emails = self.emails();
        let current = self.users.get(user.id).ok_or(StoreError::EditConflict)?;
        let old_key = current.email.to_lowercase();
        if key != old_key && emails.contains_key(&key) {
            return Err(StoreError::DuplicateEmail);
        }

        self.users.update(user)?;
        if key != old_key {
            emails.remove(&old_key);
            emails.insert(key, user.id);
        }
        Ok(())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn insert(&self, token: &Token) -> Result<(), StoreError> {
        self.tokens.insert(
            token.hash,
            StoredToken {
                user_id: token.user_id,
                expiry: token.expiry,
                scope: token.scope,
            },
        );
        Ok(())
    }

    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        self.tokens
            .retain(|_, t| !(t.scope == scope && t.user_id == user_id));
        Ok(())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_all_for_user(&self, user_id: i64) -> Result<Permissions, StoreError> {
        Ok(self
            .permissions
            .get(&user_id)
            .map(|p| p.value().clone())
            .unwrap_or_default())
    }

    async fn add_for_user(&self, user_id: i64, codes: &[&str]) -> Result<(), StoreError> {
        let mut permissions = self.permissions.entry(user_id).or_default();
        for code in codes {
            permissions.grant(code);
        }
        Ok(())
    }
}

#[async_trait]
impl MovieStore for MemoryStore {
    async fn insert(&self, movie: &mut Movie) -> Result<(), StoreError> {
        movie.id = self.movies.next_id();
        movie.created_at = Utc::now();
        movie.version = 1;
        self.movies.insert(movie.clone());
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.movies.get(id).ok_or(StoreError::NotFound)
    }

    async fn get_all(
        &self,
        filter: &MovieFilter,
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let mut movies: Vec<Movie> = self
            .movies
            .rows()
            .into_iter()
            .filter(|m| filter.matches(m))
            .collect();
        movies.sort_by(|a, b| compare_movies(a, b, filters));
        Ok(paginate(movies, filters))
    }

    async fn update(&self, movie: &mut Movie) -> Result<(), StoreError> {
        self.movies.update(movie)
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        self.movies.remove(id).map(|_| ()).ok_or(StoreError::NotFound)
    }
}
