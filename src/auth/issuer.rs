//! Token issuance.

use std::sync::Arc;
use std::time::Duration;

use crate::data::{Scope, StoreError, Token, TokenStore};
use crate::resilience::bounded;

/// Generates tokens and persists their hashes.
#[derive(Clone)]
pub struct TokenIssuer {
    tokens: Arc<dyn TokenStore>,
    query_timeout: Duration,
}

impl TokenIssuer {
    pub fn new(tokens: Arc<dyn TokenStore>, query_timeout: Duration) -> Self {
        Self {
            tokens,
            query_timeout,
        }
    }

    /// Create a token for `user_id`.
    ///
    /// The plaintext is only returned once the hash has been stored.
    pub async fn issue(
        &self,
        user_id: i64,
        ttl: chrono::Duration,
        scope: Scope,
    ) -> Result<Token, StoreError> {
        let token = Token::generate(user_id, ttl, scope);
        bounded(self.query_timeout, self.tokens.insert(&token)).await?;

        tracing::debug!(user_id, scope = scope.as_str(), expiry = %token.expiry, "Issued token");
        Ok(token)
    }

    /// Remove every token of `scope` belonging to `user_id`.
    pub async fn delete_all_for_scope(&self, scope: Scope, user_id: i64) -> Result<(), StoreError> {
        bounded(self.query_timeout, self.tokens.delete_all_for_user(scope, user_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::data::tokens::is_well_formed;
    use crate::data::MemoryStore;

    struct BrokenTokens;

    #[async_trait]
    impl TokenStore for BrokenTokens {
        async fn insert(&self, _token: &Token) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn delete_all_for_user(&self, _scope: Scope, _user_id: i64) -> Result<(), StoreError> {
            Ok(())
        }
    }

    struct StuckTokens;

    #[async_trait]
    impl TokenStore for StuckTokens {
        async fn insert(&self, _token: &Token) -> Result<(), StoreError> {
            std::future::pending().await
        }

        async fn delete_all_for_user(&self, _scope: Scope, _user_id: i64) -> Result<(), StoreError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_issue_persists_before_returning() {
        let store = Arc::new(MemoryStore::new());
        let issuer = TokenIssuer::new(store.clone(), Duration::from_secs(1));

        let token = issuer
            .issue(7, Scope::Activation.ttl(), Scope::Activation)
            .await
            .unwrap();

        assert!(is_well_formed(&token.plaintext));
        assert_eq!(token.user_id, 7);
        assert_eq!(store.token_count(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_returns_no_token() {
        let issuer = TokenIssuer::new(Arc::new(BrokenTokens), Duration::from_secs(1));
        let result = issuer
            .issue(1, Scope::Authentication.ttl(), Scope::Authentication)
            .await;
        assert_eq!(result.unwrap_err(), StoreError::Backend("disk full".into()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_store_times_out() {
        let issuer = TokenIssuer::new(Arc::new(StuckTokens), Duration::from_secs(3));
        let result = issuer
            .issue(1, Scope::Authentication.ttl(), Scope::Authentication)
            .await;
        assert_eq!(result.unwrap_err(), StoreError::Timeout);
    }

    #[tokio::test]
    async fn test_delete_all_for_scope() {
        let store = Arc::new(MemoryStore::new());
        let issuer = TokenIssuer::new(store.clone(), Duration::from_secs(1));
        for _ in 0..3 {
            issuer.issue(1, Scope::Activation.ttl(), Scope::Activation).await.unwrap();
        }
        issuer.issue(1, Scope::Authentication.ttl(), Scope::Authentication).await.unwrap();

        issuer.delete_all_for_scope(Scope::Activation, 1).await.unwrap();
        assert_eq!(store.token_count(), 1);
    }
}
