use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{StoredSession, TokenStore};
use crate::error::StoreError;
use crate::models::{TokenPair, User};

/// A store persisted as a small JSON document, the on-disk counterpart of
/// the browser's local storage.
///
/// Tokens are written in clear text with no expiry metadata; protect the
/// file with filesystem permissions.
pub struct FileStore {
    path: PathBuf,
    inner: RwLock<StoredSession>,
}

impl FileStore {
    /// Opens the store at `path`. A missing file is an empty session; a file
    /// that cannot be parsed is logged and treated as empty as well.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let session = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<StoredSession>(&bytes) {
                Ok(session) => session,
                Err(e) => {
                    warn!(
                        event_name = "store.file.corrupt",
                        event_domain = "store",
                        path = %path.display(),
                        "Ignoring unreadable token file: {}",
                        e
                    );
                    StoredSession::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No token file at '{}', starting empty", path.display());
                StoredSession::default()
            }
            Err(e) => return Err(StoreError::Read(format!("{}: {}", path.display(), e))),
        };

        Ok(FileStore {
            path,
            inner: RwLock::new(session),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, session: &StoredSession) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Write(format!("{}: {}", parent.display(), e)))?;
        }

        let body = serde_json::to_vec_pretty(session)
            .map_err(|e| StoreError::Write(format!("failed to serialize session: {}", e)))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| StoreError::Write(format!("{}: {}", self.path.display(), e)))
    }

    /// Applies `change` and persists the result while holding the write lock.
    /// Memory is updated even when the disk write fails, so a failed write
    /// can never resurrect cleared credentials for this process.
    async fn update<F>(&self, change: F) -> Result<(), StoreError>
    where
        F: FnOnce(&StoredSession) -> StoredSession + Send,
    {
        let mut inner = self.inner.write().await;
        let next = change(&inner);
        let persisted = self.persist(&next).await;
        *inner = next;
        persisted
    }
}

#[async_trait]
impl TokenStore for FileStore {
    async fn get(&self) -> TokenPair {
        self.inner.read().await.tokens()
    }

    async fn set(&self, tokens: TokenPair) -> Result<(), StoreError> {
        let tokens = TokenPair::new(tokens.access_token, tokens.refresh_token);
        self.update(move |current| current.with_tokens(tokens)).await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.update(|_| StoredSession::default()).await
    }

    async fn get_user(&self) -> Option<User> {
        self.inner.read().await.user.clone()
    }

    async fn set_user(&self, user: Option<User>) -> Result<(), StoreError> {
        self.update(move |current| StoredSession {
            user,
            ..current.clone()
        })
        .await
    }

    fn backend_name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let store = FileStore::open(&path).await.unwrap();
        store
            .set(TokenPair::new(Some("a1".into()), Some("r1".into())))
            .await
            .unwrap();
        store
            .set_user(Some(User::new("u1", "Ann", "ann@example.com", None, None)))
            .await
            .unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        assert_eq!(reopened.get().await.access_token.as_deref(), Some("a1"));
        assert_eq!(reopened.get_user().await.map(|u| u.id), Some("u1".to_string()));
    }

    #[tokio::test]
    async fn uses_local_storage_key_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let store = FileStore::open(&path).await.unwrap();
        store
            .set(TokenPair::new(Some("a1".into()), Some("r1".into())))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["accessToken"], "a1");
        assert_eq!(raw["refreshToken"], "r1");
    }

    #[tokio::test]
    async fn corrupt_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileStore::open(&path).await.unwrap();
        assert!(store.get().await.is_empty());
    }

    #[tokio::test]
    async fn clear_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let store = FileStore::open(&path).await.unwrap();
        store
            .set(TokenPair::new(Some("a1".into()), Some("r1".into())))
            .await
            .unwrap();
        store.clear().await.unwrap();

        let reopened = FileStore::open(&path).await.unwrap();
        assert!(reopened.get().await.is_empty());
        assert!(reopened.get_user().await.is_none());
    }
}
