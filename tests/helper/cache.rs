//! Download cache fixtures

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use buildpack_cache::cache::{
    CacheKey, CacheKind, CacheRoots, CachedArtifact, DownloadCache, HttpSettings,
    InternetAvailability, build_client,
};

/// A download cache over a mutable and an immutable root in a temp directory
pub struct TestCache {
    pub temp_dir: TempDir,
    pub availability: Arc<InternetAvailability>,
    pub cache: Arc<DownloadCache>,
}

impl TestCache {
    pub fn new(available: bool) -> Self {
        Self::with_settings(available, &HttpSettings::default())
    }

    pub fn with_settings(available: bool, settings: &HttpSettings) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let availability = Arc::new(InternetAvailability::new(available));
        let roots = CacheRoots::new(
            CacheKind::Application,
            temp_dir.path().join("mutable"),
            vec![temp_dir.path().join("immutable")],
        );
        let client = build_client(settings).unwrap();
        let cache = Arc::new(DownloadCache::with_client(
            roots,
            availability.clone(),
            client,
        ));

        Self {
            temp_dir,
            availability,
            cache,
        }
    }

    pub fn mutable_root(&self) -> PathBuf {
        self.temp_dir.path().join("mutable")
    }

    pub fn immutable_root(&self) -> PathBuf {
        self.temp_dir.path().join("immutable")
    }

    /// Path of one of the entry files for `uri` in the mutable root
    pub fn mutable_file(&self, uri: &str, extension: &str) -> PathBuf {
        self.mutable_root()
            .join(CacheKey::new(uri).file_name(extension))
    }
}

/// Pre-populate `root` with content for `uri`
pub fn seed(root: &Path, uri: &str, content: &str) {
    std::fs::create_dir_all(root).unwrap();
    std::fs::write(root.join(CacheKey::new(uri).file_name("cached")), content).unwrap();
}

pub async fn read(artifact: CachedArtifact) -> String {
    artifact.read_to_string().await.unwrap()
}
