//! Persistence contract.
//!
//! # Data Flow
//! ```text
//! handler / auth component
//!     → resilience::timeouts::bounded (per-call deadline)
//!     → Models (trait objects)
//!     → backend (MemoryStore, or any other implementation of the traits)
//! ```
//!
//! # Design Decisions
//! - Stores return a typed `StoreError`; callers map it to an `ApiError`
//! - Mutable entities carry a version; updates are conditional on it
//! - Only token hashes are ever handed to a store

pub mod filters;
pub mod memory;
pub mod movies;
pub mod permissions;
pub mod tokens;
pub mod users;
pub mod versioned;

use std::sync::Arc;

use thiserror::Error;

pub use filters::{Filters, Metadata};
pub use memory::MemoryStore;
pub use movies::{Movie, MovieFilter, MovieStore, MOVIE_SORT_SAFELIST};
pub use permissions::{PermissionStore, Permissions, MOVIES_READ, MOVIES_WRITE};
pub use tokens::{Scope, Token, TokenHash, TokenStore};
pub use users::{Password, PasswordError, Principal, User, UserStore};
pub use versioned::{Versioned, VersionedTable};

/// Errors returned by the persistence layer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    /// The conditional write matched no row: another writer got there first.
    #[error("edit conflict")]
    EditConflict,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("query exceeded its deadline")]
    Timeout,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Handles to every store the API talks to.
#[derive(Clone)]
pub struct Models {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub permissions: Arc<dyn PermissionStore>,
    pub movies: Arc<dyn MovieStore>,
}

impl Models {
    /// Wire every store to a single backend implementing all four traits.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: UserStore + TokenStore + PermissionStore + MovieStore + 'static,
    {
        Self {
            users: store.clone(),
            tokens: store.clone(),
            permissions: store.clone(),
            movies: store,
        }
    }

    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(MemoryStore::new()))
    }
}
