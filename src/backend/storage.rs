use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Object storage for uploaded photos.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `data` under `key`, replacing anything already there.
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()>;

    /// Public URL for a stored key.
    fn public_url(&self, key: &str) -> String;
}

/// Files on local disk, served by the HTTP layer under `public_base_url`.
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
    public_base_url: String,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Keys are relative paths without `..` or absolute components.
    fn resolve(&self, key: &str) -> AppResult<PathBuf> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(AppError::Storage(format!("Invalid storage key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn upload(&self, key: &str, data: &[u8], content_type: &str) -> AppResult<()> {
        let path = self.resolve(key)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| AppError::Storage(format!("Failed to create directory: {e}")))?;
        }

        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Storage(format!("Failed to write file: {e}")))?;

        tracing::debug!(key, content_type, bytes = data.len(), "Stored object");
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, key)
    }
}
