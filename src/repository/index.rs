//! Repository indexes
//!
//! A repository root serves an `index.yml` mapping version strings to artifact
//! locations. Roots are written as templates that may reference the
//! configured default root, the host platform and the host architecture.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use indexmap::IndexMap;
use tokio::sync::OnceCell;
use tracing::debug;
use url::Url;

use crate::cache::{ArtifactCache, sanitize_uri};
use crate::repository::error::RepositoryError;
use crate::repository::platform::{HostProbe, SystemProbe, architecture, platform};
use crate::version::{Version, VersionPattern, resolve};

const INDEX_FILE: &str = "index.yml";

const DEFAULT_ROOT_PLACEHOLDER: &str = "{default.repository.root}";
const PLATFORM_PLACEHOLDER: &str = "{platform}";
const ARCHITECTURE_PLACEHOLDER: &str = "{architecture}";

/// The version catalog of one concrete repository root
#[derive(Debug, Clone, PartialEq)]
pub struct RepositoryIndex {
    root: String,
    entries: IndexMap<String, String>,
}

impl RepositoryIndex {
    /// Fetch and parse `<root>/index.yml` through the cache
    pub async fn load(root: &str, cache: &dyn ArtifactCache) -> Result<Self, RepositoryError> {
        let uri = format!("{root}/{INDEX_FILE}");
        debug!("Loading repository index {}", sanitize_uri(&uri));

        let content = cache.get(&uri).await?.read_to_string().await?;
        Self::parse(root, &uri, &content)
    }

    pub fn parse(root: &str, uri: &str, content: &str) -> Result<Self, RepositoryError> {
        let entries = serde_yaml::from_str::<Option<IndexMap<String, String>>>(content)
            .map_err(|source| RepositoryError::InvalidIndex {
                uri: sanitize_uri(uri),
                source,
            })?
            .unwrap_or_default();

        Ok(Self {
            root: root.to_string(),
            entries,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Version strings in index order
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// The best version matching `pattern` (all versions when `None`) and its URI
    pub fn find_item(
        &self,
        pattern: Option<&VersionPattern>,
    ) -> Result<(Version, String), RepositoryError> {
        let versions: Vec<&str> = self.versions().collect();
        let resolved = resolve(pattern, &versions).and_then(|version| {
            self.entries
                .get(version.as_str())
                .map(|location| (version, location))
        });

        let Some((version, location)) = resolved else {
            return Err(RepositoryError::NoMatch {
                pattern: pattern.map_or("+", VersionPattern::as_str).to_string(),
                available: versions.iter().map(|v| v.to_string()).collect(),
            });
        };

        let uri = self.locate(location)?;
        debug!("Resolved {} to {}", version, sanitize_uri(&uri));
        Ok((version, uri))
    }

    /// Absolute locations are used as-is; relative ones are resolved against the root
    fn locate(&self, location: &str) -> Result<String, RepositoryError> {
        if Url::parse(location).is_ok() {
            return Ok(location.to_string());
        }

        let invalid = |source| RepositoryError::InvalidLocation {
            root: sanitize_uri(&self.root),
            location: location.to_string(),
            source,
        };
        let base = Url::parse(&format!("{}/", self.root)).map_err(invalid)?;
        Ok(base.join(location).map_err(invalid)?.to_string())
    }
}

/// Shared state for repository lookups within one run
///
/// Each concrete root's index is loaded at most once. Loads of different
/// roots proceed independently.
pub struct RepositoryContext {
    cache: Arc<dyn ArtifactCache>,
    default_repository_root: Option<String>,
    host: Arc<dyn HostProbe>,
    indices: Mutex<HashMap<String, Arc<OnceCell<Arc<RepositoryIndex>>>>>,
}

impl RepositoryContext {
    pub fn new(cache: Arc<dyn ArtifactCache>, default_repository_root: Option<String>) -> Self {
        Self {
            cache,
            default_repository_root,
            host: Arc::new(SystemProbe),
            indices: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_host(mut self, host: Arc<dyn HostProbe>) -> Self {
        self.host = host;
        self
    }

    /// The index for a root template, loading it on first use
    pub async fn index(&self, template: &str) -> Result<Arc<RepositoryIndex>, RepositoryError> {
        let root = self.expand(template)?;

        let cell = self
            .indices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(root.clone())
            .or_default()
            .clone();
        if let Some(index) = cell.get() {
            debug!("Using loaded index for {}", sanitize_uri(&root));
            return Ok(index.clone());
        }

        // a failed load leaves the cell empty for the next caller
        cell.get_or_try_init(|| async {
            RepositoryIndex::load(&root, self.cache.as_ref())
                .await
                .map(Arc::new)
        })
        .await
        .cloned()
    }

    /// Substitute placeholders and drop any trailing `/`
    pub fn expand(&self, template: &str) -> Result<String, RepositoryError> {
        let mut root = template.to_string();

        if root.contains(DEFAULT_ROOT_PLACEHOLDER) {
            let default = self
                .default_repository_root
                .as_deref()
                .ok_or_else(|| RepositoryError::MissingDefaultRoot(template.to_string()))?;
            root = root.replace(DEFAULT_ROOT_PLACEHOLDER, default.trim_end_matches('/'));
        }
        if root.contains(PLATFORM_PLACEHOLDER) {
            root = root.replace(PLATFORM_PLACEHOLDER, &platform(self.host.as_ref())?);
        }
        if root.contains(ARCHITECTURE_PLACEHOLDER) {
            root = root.replace(ARCHITECTURE_PLACEHOLDER, &architecture(self.host.as_ref())?);
        }

        Ok(root.trim_end_matches('/').to_string())
    }
}
