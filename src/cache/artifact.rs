use std::path::PathBuf;

use tokio::fs::File;
use tokio::io::AsyncReadExt;

#[cfg(test)]
use mockall::automock;

use crate::cache::error::CacheError;

/// A cached artifact, opened read-only
#[derive(Debug)]
pub struct CachedArtifact {
    pub path: PathBuf,
    pub file: File,
    /// Whether the content was (re)downloaded by this lookup
    pub downloaded: bool,
}

impl CachedArtifact {
    pub async fn read_to_string(mut self) -> Result<String, CacheError> {
        let mut content = String::new();
        self.file
            .read_to_string(&mut content)
            .await
            .map_err(|e| CacheError::io(format!("reading {}", self.path.display()), e))?;
        Ok(content)
    }
}

/// Source of locally cached copies of remote artifacts
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ArtifactCache: Send + Sync {
    /// Return a local copy of the artifact at `uri`, downloading it if possible
    async fn get(&self, uri: &str) -> Result<CachedArtifact, CacheError>;

    /// Remove the mutable cached copy of the artifact at `uri`
    async fn evict(&self, uri: &str) -> Result<(), CacheError>;
}
