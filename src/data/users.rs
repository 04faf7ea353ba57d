//! Users and request principals.

use std::fmt;

use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use subtle::ConstantTimeEq;
use thiserror::Error;

use super::tokens::{Scope, TokenHash};
use super::versioned::Versioned;
use super::StoreError;
use crate::validator::{is_email, Validator};

const SALT_BYTES: usize = 16;
const HASH_BYTES: usize = 32;

#[derive(Debug, Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

/// Argon2id password hash with a per-password random salt.
///
/// Hashing is CPU-bound; async callers should run it on a blocking thread.
#[derive(Clone)]
pub struct Password {
    salt: [u8; SALT_BYTES],
    hash: [u8; HASH_BYTES],
}

impl Password {
    pub fn hash(plaintext: &str) -> Result<Self, PasswordError> {
        let mut salt = [0u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt);
        let hash = derive(&salt, plaintext)?;
        Ok(Self { salt, hash })
    }

    /// Constant-time comparison against a candidate plaintext.
    pub fn matches(&self, plaintext: &str) -> bool {
        match derive(&self.salt, plaintext) {
            Ok(candidate) => candidate[..].ct_eq(&self.hash[..]).into(),
            Err(e) => {
                tracing::error!(error = %e, "Password verification failed");
                false
            }
        }
    }
}

fn derive(salt: &[u8], plaintext: &str) -> Result<[u8; HASH_BYTES], PasswordError> {
    let mut out = [0u8; HASH_BYTES];
    Argon2::default()
        .hash_password_into(plaintext.as_bytes(), salt, &mut out)
        .map_err(|e| PasswordError(e.to_string()))?;
    Ok(out)
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password([REDACTED])")
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub password: Password,
    pub activated: bool,
    #[serde(skip)]
    pub version: i32,
}

impl User {
    /// A not-yet-persisted, inactive user.
    pub fn new(name: String, email: String, password: Password) -> Self {
        Self {
            id: 0,
            created_at: Utc::now(),
            name,
            email,
            password,
            activated: false,
            version: 1,
        }
    }
}

impl Versioned for User {
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

/// Identity a request is attributed to.
#[derive(Debug, Clone)]
pub enum Principal {
    Anonymous,
    User(User),
}

impl Principal {
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Principal::Anonymous)
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            Principal::Anonymous => None,
            Principal::User(user) => Some(user),
        }
    }
}

pub fn validate_email(v: &mut Validator, email: &str) {
    v.check(!email.is_empty(), "email", "must be provided");
    v.check(is_email(email), "email", "must be a valid email address");
}

pub fn validate_password_plaintext(v: &mut Validator, password: &str) {
    v.check(!password.is_empty(), "password", "must be provided");
    v.check(password.len() >= 8, "password", "must be at least 8 bytes long");
    v.check(password.len() <= 72, "password", "must not be more than 72 bytes long");
}

/// Name and email rules, checked before any password is hashed.
pub fn validate_identity(v: &mut Validator, name: &str, email: &str) {
    v.check(!name.is_empty(), "name", "must be provided");
    v.check(name.len() <= 500, "name", "must not be more than 500 bytes long");
    validate_email(v, email);
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Assigns id, creation time and version on success.
    async fn insert(&self, user: &mut User) -> Result<(), StoreError>;

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;

    /// The owner of an unexpired token of `scope` whose hash matches.
    async fn get_for_token(
        &self,
        scope: Scope,
        token_hash: &TokenHash,
        now: DateTime<Utc>,
    ) -> Result<User, StoreError>;

    /// Conditional on `user.version`; bumps it on success.
    async fn update(&self, user: &mut User) -> Result<(), StoreError>;
}
