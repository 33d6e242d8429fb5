use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{file_store::FileStore, memory_store::MemoryStore};
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{TokenPair, User};

/// Everything a store persists. Field names match the keys the browser
/// client kept in local storage.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct StoredSession {
    #[serde(rename = "accessToken", default)]
    pub access_token: Option<String>,
    #[serde(rename = "refreshToken", default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}

impl StoredSession {
    pub fn tokens(&self) -> TokenPair {
        TokenPair::new(self.access_token.clone(), self.refresh_token.clone())
    }

    pub fn with_tokens(&self, tokens: TokenPair) -> Self {
        StoredSession {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            user: self.user.clone(),
        }
    }
}

/// The single source of truth for the session's credentials.
///
/// `set` replaces both tokens under one write; a concurrent `get` observes
/// either the old pair or the new pair, never a mix.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self) -> TokenPair;
    async fn set(&self, tokens: TokenPair) -> Result<(), StoreError>;
    /// Removes both tokens and the cached user.
    async fn clear(&self) -> Result<(), StoreError>;
    async fn get_user(&self) -> Option<User>;
    async fn set_user(&self, user: Option<User>) -> Result<(), StoreError>;
    fn backend_name(&self) -> &str;

    async fn access_token(&self) -> Option<String> {
        self.get().await.access_token
    }
}

/// Creates a concrete store implementation based on the StoreConfig.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn TokenStore>, StoreError> {
    match config {
        StoreConfig::Memory => {
            info!("Using in-memory token store; session ends with the process.");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreConfig::File(file_config) => {
            let store = FileStore::open(&file_config.path).await?;
            info!("Using file token store at '{}'", file_config.path.display());
            Ok(Arc::new(store))
        }
    }
}
