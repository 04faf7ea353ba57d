//! Opaque bearer tokens.
//!
//! A token is 16 bytes from the OS RNG, encoded as unpadded URL-safe
//! base64 (22 characters). The plaintext exists only in memory between
//! issuance and the response that returns it; stores only ever see the
//! SHA-256 of the plaintext.

use std::fmt;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::StoreError;
use crate::validator::Validator;

/// Random bytes per token.
pub const TOKEN_BYTES: usize = 16;

/// Length of the encoded plaintext.
pub const TOKEN_PLAINTEXT_LEN: usize = 22;

/// The operation class a token authorizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Activation,
    Authentication,
}

impl Scope {
    /// Fixed lifetime policy per scope.
    pub fn ttl(self) -> Duration {
        match self {
            Scope::Activation => Duration::hours(72),
            Scope::Authentication => Duration::hours(24),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Activation => "activation",
            Scope::Authentication => "authentication",
        }
    }
}

/// One-way hash of a token plaintext.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHash([u8; 32]);

impl TokenHash {
    pub fn of(plaintext: &str) -> Self {
        Self(Sha256::digest(plaintext.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for TokenHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenHash({})", hex::encode(&self.0[..6]))
    }
}

/// A freshly issued token.
#[derive(Clone, Serialize)]
pub struct Token {
    #[serde(rename = "token")]
    pub plaintext: String,
    #[serde(skip)]
    pub hash: TokenHash,
    #[serde(skip)]
    pub user_id: i64,
    pub expiry: DateTime<Utc>,
    #[serde(skip)]
    pub scope: Scope,
}

impl Token {
    pub fn generate(user_id: i64, ttl: Duration, scope: Scope) -> Self {
        let mut raw = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);

        let plaintext = URL_SAFE_NO_PAD.encode(raw);
        let hash = TokenHash::of(&plaintext);

        Self {
            plaintext,
            hash,
            user_id,
            expiry: Utc::now() + ttl,
            scope,
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("plaintext", &"[REDACTED]")
            .field("hash", &self.hash)
            .field("user_id", &self.user_id)
            .field("expiry", &self.expiry)
            .field("scope", &self.scope)
            .finish()
    }
}

/// Shape check performed before any lookup.
pub fn is_well_formed(plaintext: &str) -> bool {
    plaintext.len() == TOKEN_PLAINTEXT_LEN
        && plaintext
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

pub fn validate_token_plaintext(v: &mut Validator, plaintext: &str) {
    v.check(!plaintext.is_empty(), "token", "must be provided");
    v.check(is_well_formed(plaintext), "token", "must be 22 bytes long");
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Persist the hash, owner, expiry and scope of a token.
    async fn insert(&self, token: &Token) -> Result<(), StoreError>;

    /// Remove every token of `scope` owned by `user_id`.
    async fn delete_all_for_user(&self, scope: Scope, user_id: i64) -> Result<(), StoreError>;
}
