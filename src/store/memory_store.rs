use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{StoredSession, TokenStore};
use crate::error::StoreError;
use crate::models::{TokenPair, User};

/// A store that lives as long as the process. Used by tests and by callers
/// that do not want credentials on disk.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoredSession>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Start from an existing pair, e.g. tokens handed over by another process.
    pub fn with_tokens(tokens: TokenPair) -> Self {
        MemoryStore {
            inner: RwLock::new(StoredSession::default().with_tokens(tokens)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get(&self) -> TokenPair {
        self.inner.read().await.tokens()
    }

    async fn set(&self, tokens: TokenPair) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        *inner = inner.with_tokens(TokenPair::new(tokens.access_token, tokens.refresh_token));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.inner.write().await = StoredSession::default();
        Ok(())
    }

    async fn get_user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    async fn set_user(&self, user: Option<User>) -> Result<(), StoreError> {
        self.inner.write().await.user = user;
        Ok(())
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
