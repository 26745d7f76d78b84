//! Download cache
//!
//! Resolves a URI to a local file. While the internet is available every
//! lookup revalidates the mutable copy with a conditional GET; otherwise, or
//! when the download fails, the mutable root and then each immutable root is
//! searched for a previously cached copy.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{
    CONTENT_ENCODING, CONTENT_LENGTH, ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE,
    IF_NONE_MATCH, LAST_MODIFIED, LOCATION,
};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::artifact::{ArtifactCache, CachedArtifact};
use crate::cache::availability::InternetAvailability;
use crate::cache::error::CacheError;
use crate::cache::file_cache::{ExclusiveGuard, FileCache, ImmutableEntry};
use crate::cache::http::{HttpSettings, build_client, credentials, without_credentials};
use crate::cache::key::{CacheKey, sanitize_uri};
use crate::cache::roots::CacheRoots;
use crate::config::{REDIRECT_LIMIT, RETRY_LIMIT};

/// Encodings whose `Content-Length` describes the encoded body, not the stored bytes
const COMPRESSED_ENCODINGS: &[&str] = &["br", "compress", "deflate", "gzip", "x-gzip"];

/// How a response to a conditional GET affects the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// 304: the cached copy is current
    Fresh,
    /// 200: the body replaces the cached copy
    Updated,
    /// 301, 302, 303 or 307: repeat the request against the location
    Redirected(Url),
    /// Any other status
    Failed(StatusCode),
}

/// Classify a response status; redirect locations are resolved against `request_url`
pub fn classify(
    status: StatusCode,
    location: Option<&str>,
    request_url: &Url,
) -> Result<ResponseKind, CacheError> {
    match status {
        StatusCode::OK => Ok(ResponseKind::Updated),
        StatusCode::NOT_MODIFIED => Ok(ResponseKind::Fresh),
        StatusCode::MOVED_PERMANENTLY
        | StatusCode::FOUND
        | StatusCode::SEE_OTHER
        | StatusCode::TEMPORARY_REDIRECT => location
            .and_then(|location| request_url.join(location).ok())
            .map(ResponseKind::Redirected)
            .ok_or_else(|| CacheError::InvalidRedirect(sanitize_uri(request_url.as_str()))),
        status => Ok(ResponseKind::Failed(status)),
    }
}

/// Failed attempts made against one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    limit: u32,
    failures: u32,
}

impl RetryBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, failures: 0 }
    }

    /// Record a failure, returning whether another attempt is permitted
    pub fn record_failure(&mut self) -> bool {
        self.failures += 1;
        self.failures <= self.limit
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}

enum Hop {
    Complete { downloaded: bool },
    Redirect(Url),
}

pub struct DownloadCache {
    roots: CacheRoots,
    availability: Arc<InternetAvailability>,
    client: Client,
}

impl DownloadCache {
    pub fn new(
        roots: CacheRoots,
        availability: Arc<InternetAvailability>,
        settings: &HttpSettings,
    ) -> Result<Self, CacheError> {
        Ok(Self::with_client(roots, availability, build_client(settings)?))
    }

    pub fn with_client(
        roots: CacheRoots,
        availability: Arc<InternetAvailability>,
        client: Client,
    ) -> Self {
        debug!(
            "Download cache: mutable root {}, immutable roots {:?}",
            roots.mutable.display(),
            roots.immutable
        );
        Self {
            roots,
            availability,
            client,
        }
    }

    pub fn roots(&self) -> &CacheRoots {
        &self.roots
    }

    pub fn availability(&self) -> &Arc<InternetAvailability> {
        &self.availability
    }

    /// Return a local copy of the artifact at `uri`
    ///
    /// The returned file stays readable even if another task replaces or
    /// evicts the entry afterwards.
    pub async fn get(&self, uri: &str) -> Result<CachedArtifact, CacheError> {
        let key = CacheKey::new(uri);
        let sanitized = sanitize_uri(uri);
        let mut downloaded = false;
        let mut failure = None;

        if self.availability.is_available() {
            match self.download(uri, &key).await {
                Ok(updated) => downloaded = updated,
                Err(e) => {
                    warn!(
                        "Unable to download {} into cache {}: {}",
                        sanitized,
                        self.roots.mutable.display(),
                        e
                    );
                    failure = Some(e);
                }
            }
        } else {
            debug!("Internet unavailable, looking up {} in caches", sanitized);
        }

        match self.lookup(&key, downloaded).await {
            Some(artifact) => {
                if artifact.downloaded {
                    info!("Downloaded {} to {}", sanitized, artifact.path.display());
                } else {
                    debug!("Using cached {} from {}", sanitized, artifact.path.display());
                }
                Ok(artifact)
            }
            None => Err(CacheError::NotCached {
                uri: sanitized,
                source: failure.map(Box::new),
            }),
        }
    }

    /// Remove the mutable copy of `uri`; immutable roots are never touched
    pub async fn evict(&self, uri: &str) -> Result<(), CacheError> {
        debug!("Evicting {}", sanitize_uri(uri));
        FileCache::open(&self.roots.mutable, CacheKey::new(uri))
            .await?
            .destroy()
            .await
    }

    async fn download(&self, uri: &str, key: &CacheKey) -> Result<bool, CacheError> {
        let cache = FileCache::open(&self.roots.mutable, key.clone()).await?;
        let mut target = Url::parse(uri).map_err(|source| CacheError::InvalidUri {
            uri: sanitize_uri(uri),
            source,
        })?;

        for _ in 0..=REDIRECT_LIMIT {
            match self.request_with_retries(&target, &cache).await? {
                Hop::Complete { downloaded } => return Ok(downloaded),
                Hop::Redirect(location) => {
                    debug!(
                        "Redirected {} to {}",
                        sanitize_uri(target.as_str()),
                        sanitize_uri(location.as_str())
                    );
                    target = location;
                }
            }
        }

        Err(CacheError::TooManyRedirects(sanitize_uri(uri)))
    }

    async fn request_with_retries(&self, target: &Url, cache: &FileCache) -> Result<Hop, CacheError> {
        let mut budget = RetryBudget::new(RETRY_LIMIT);

        loop {
            let result = match self.attempt(target, cache).await {
                Ok(ResponseKind::Updated) => Ok(Hop::Complete { downloaded: true }),
                Ok(ResponseKind::Fresh) => Ok(Hop::Complete { downloaded: false }),
                Ok(ResponseKind::Redirected(location)) => Ok(Hop::Redirect(location)),
                Ok(ResponseKind::Failed(status)) => Err(CacheError::UnexpectedStatus(status)),
                Err(e) => Err(e),
            };

            match result {
                Err(e) if e.is_network_failure() => {
                    if !budget.record_failure() {
                        self.availability
                            .mark_unavailable(format!("Request failed: {e}"));
                        return Err(e);
                    }
                    warn!(
                        "Request failure {} of {} for {}, retrying: {}",
                        budget.failures(),
                        budget.limit(),
                        sanitize_uri(target.as_str()),
                        e
                    );
                }
                other => return other,
            }
        }
    }

    async fn attempt(&self, target: &Url, cache: &FileCache) -> Result<ResponseKind, CacheError> {
        let guard = cache.lock_exclusive().await?;

        let mut request = self.client.get(without_credentials(target));
        if let Some((user, password)) = credentials(target) {
            request = request.basic_auth(user, Some(password));
        }
        if let Some(etag) = guard.etag().await? {
            request = request.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = guard.last_modified().await? {
            request = request.header(IF_MODIFIED_SINCE, last_modified);
        }

        debug!("Request: GET {}", sanitize_uri(target.as_str()));
        let response = request.send().await?;
        debug!("Response status: {}", response.status());
        debug!("Response headers: {:?}", response.headers());

        let location = header(response.headers(), LOCATION);
        let kind = classify(response.status(), location.as_deref(), target)?;
        match &kind {
            ResponseKind::Updated => persist(response, &guard).await?,
            ResponseKind::Fresh => debug!("Cached copy up to date"),
            ResponseKind::Failed(_) => {
                debug!("Response body: {}", response.text().await.unwrap_or_default())
            }
            ResponseKind::Redirected(_) => {}
        }

        Ok(kind)
    }

    /// First readable copy, mutable root first; unreadable roots are skipped
    async fn lookup(&self, key: &CacheKey, downloaded: bool) -> Option<CachedArtifact> {
        match self.lookup_mutable(key, downloaded).await {
            Ok(Some(artifact)) => return Some(artifact),
            Ok(None) => {}
            Err(e) => warn!(
                "Unable to read cache {}: {}",
                self.roots.mutable.display(),
                e
            ),
        }

        for root in &self.roots.immutable {
            let entry = ImmutableEntry::new(root, key);
            match entry.open_content().await {
                Ok(Some(file)) => {
                    return Some(CachedArtifact {
                        path: entry.content_path().to_path_buf(),
                        file,
                        downloaded: false,
                    });
                }
                Ok(None) => {}
                Err(e) => warn!("Unable to read cache {}: {}", root.display(), e),
            }
        }

        None
    }

    async fn lookup_mutable(
        &self,
        key: &CacheKey,
        downloaded: bool,
    ) -> Result<Option<CachedArtifact>, CacheError> {
        let cache = FileCache::open(&self.roots.mutable, key.clone()).await?;
        let guard = cache.lock_shared().await?;

        Ok(guard.open_content().await?.map(|file| CachedArtifact {
            path: guard.content_path().to_path_buf(),
            file,
            downloaded,
        }))
    }
}

#[async_trait]
impl ArtifactCache for DownloadCache {
    async fn get(&self, uri: &str) -> Result<CachedArtifact, CacheError> {
        DownloadCache::get(self, uri).await
    }

    async fn evict(&self, uri: &str) -> Result<(), CacheError> {
        DownloadCache::evict(self, uri).await
    }
}

/// Stream a 200 response into the entry, validating its size
async fn persist(mut response: Response, guard: &ExclusiveGuard<'_>) -> Result<(), CacheError> {
    let etag = header(response.headers(), ETAG);
    let last_modified = header(response.headers(), LAST_MODIFIED);
    let expected = if is_compressed(response.headers()) {
        None
    } else {
        header(response.headers(), CONTENT_LENGTH).and_then(|length| length.parse::<u64>().ok())
    };

    let mut content = guard.begin_content()?;
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => content.write(&chunk).await?,
            Ok(None) => break,
            Err(e) => {
                if let Some(expected) = expected {
                    guard.destroy().await?;
                    return Err(CacheError::ContentIntegrity {
                        actual: content.written(),
                        expected,
                    });
                }
                return Err(e.into());
            }
        }
    }

    let actual = content.written();
    if let Some(expected) = expected {
        if actual != expected {
            guard.destroy().await?;
            return Err(CacheError::ContentIntegrity { actual, expected });
        }
        debug!("Validated content size {} is {}", actual, expected);
    }

    guard
        .commit(content, etag.as_deref(), last_modified.as_deref())
        .await
}

fn header(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn is_compressed(headers: &HeaderMap) -> bool {
    header(headers, CONTENT_ENCODING).is_some_and(|encoding| {
        COMPRESSED_ENCODINGS.contains(&encoding.trim().to_ascii_lowercase().as_str())
    })
}
