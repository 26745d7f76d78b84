//! On-disk cache entries
//!
//! An entry lives in a root directory as up to four files named after its
//! [`CacheKey`]:
//!
//! - `<key>.cached`: the artifact content
//! - `<key>.etag`: the `ETag` the content was served with
//! - `<key>.last_modified`: the `Last-Modified` the content was served with
//! - `<key>.lock`: advisory lock file, never deleted
//!
//! Mutable roots are accessed through [`FileCache`], whose guards serialize
//! writers and let readers share. Immutable roots are accessed through
//! [`ImmutableEntry`], which only reads and never locks.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use tempfile::TempPath;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::cache::error::CacheError;
use crate::cache::key::CacheKey;

const CACHED_EXTENSION: &str = "cached";
const ETAG_EXTENSION: &str = "etag";
const LAST_MODIFIED_EXTENSION: &str = "last_modified";
const LOCK_EXTENSION: &str = "lock";

/// Read access to the artifacts of one entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    cached: PathBuf,
    etag: PathBuf,
    last_modified: PathBuf,
}

impl CacheEntry {
    fn new(root: &Path, key: &CacheKey) -> Self {
        Self {
            cached: root.join(key.file_name(CACHED_EXTENSION)),
            etag: root.join(key.file_name(ETAG_EXTENSION)),
            last_modified: root.join(key.file_name(LAST_MODIFIED_EXTENSION)),
        }
    }

    pub fn content_path(&self) -> &Path {
        &self.cached
    }

    pub async fn is_cached(&self) -> bool {
        tokio::fs::try_exists(&self.cached).await.unwrap_or(false)
    }

    pub async fn etag(&self) -> Result<Option<String>, CacheError> {
        read_optional(&self.etag).await
    }

    pub async fn last_modified(&self) -> Result<Option<String>, CacheError> {
        read_optional(&self.last_modified).await
    }

    /// Open the content read-only, `None` if the entry holds no content
    pub async fn open_content(&self) -> Result<Option<File>, CacheError> {
        match File::open(&self.cached).await {
            Ok(file) => Ok(Some(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(
                format!("opening {}", self.cached.display()),
                e,
            )),
        }
    }
}

/// An entry in a read-only root
///
/// Only exposes the read side of [`CacheEntry`]; nothing in this type can
/// modify the root, and reads never take a lock.
#[derive(Debug, Clone)]
pub struct ImmutableEntry {
    entry: CacheEntry,
}

impl ImmutableEntry {
    pub fn new(root: &Path, key: &CacheKey) -> Self {
        Self {
            entry: CacheEntry::new(root, key),
        }
    }
}

impl Deref for ImmutableEntry {
    type Target = CacheEntry;

    fn deref(&self) -> &CacheEntry {
        &self.entry
    }
}

/// An entry in a mutable root
#[derive(Debug)]
pub struct FileCache {
    root: PathBuf,
    key: CacheKey,
    entry: CacheEntry,
    lock: PathBuf,
}

#[derive(Debug, Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

impl FileCache {
    /// Open the entry for `key` under `root`, creating the root if needed
    pub async fn open(root: &Path, key: CacheKey) -> Result<Self, CacheError> {
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| CacheError::io(format!("creating cache root {}", root.display()), e))?;

        Ok(Self {
            root: root.to_path_buf(),
            entry: CacheEntry::new(root, &key),
            lock: root.join(key.file_name(LOCK_EXTENSION)),
            key,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquire a shared lock; any number of readers may hold one concurrently
    pub async fn lock_shared(&self) -> Result<SharedGuard<'_>, CacheError> {
        let lock = acquire(&self.lock, LockMode::Shared).await?;
        Ok(SharedGuard {
            entry: &self.entry,
            _lock: lock,
        })
    }

    /// Acquire an exclusive lock, waiting for all other holders to release
    pub async fn lock_exclusive(&self) -> Result<ExclusiveGuard<'_>, CacheError> {
        let lock = acquire(&self.lock, LockMode::Exclusive).await?;
        Ok(ExclusiveGuard {
            cache: self,
            _lock: lock,
        })
    }

    /// Delete the entry's content and validators under an exclusive lock
    pub async fn destroy(&self) -> Result<(), CacheError> {
        self.lock_exclusive().await?.destroy().await
    }
}

/// Read access to a mutable entry; the shared lock is held until drop
#[derive(Debug)]
pub struct SharedGuard<'a> {
    entry: &'a CacheEntry,
    _lock: std::fs::File,
}

impl Deref for SharedGuard<'_> {
    type Target = CacheEntry;

    fn deref(&self) -> &CacheEntry {
        self.entry
    }
}

/// Read and write access to a mutable entry; the exclusive lock is held until drop
#[derive(Debug)]
pub struct ExclusiveGuard<'a> {
    cache: &'a FileCache,
    _lock: std::fs::File,
}

impl Deref for ExclusiveGuard<'_> {
    type Target = CacheEntry;

    fn deref(&self) -> &CacheEntry {
        &self.cache.entry
    }
}

impl ExclusiveGuard<'_> {
    /// Start writing new content into a temporary file inside the root
    ///
    /// The temporary file is removed if the returned value is dropped
    /// without being passed to [`commit`](Self::commit).
    pub fn begin_content(&self) -> Result<PartialContent, CacheError> {
        let (file, path) = tempfile::Builder::new()
            .prefix(&format!("{}.", self.cache.key))
            .suffix(".part")
            .tempfile_in(&self.cache.root)
            .map_err(|e| {
                CacheError::io(
                    format!("creating temporary file in {}", self.cache.root.display()),
                    e,
                )
            })?
            .into_parts();

        Ok(PartialContent {
            file: File::from_std(file),
            path,
            written: 0,
        })
    }

    /// Replace the entry with `content` and the given validators
    ///
    /// Validators absent from the response are removed so they can never be
    /// sent alongside content they do not describe.
    pub async fn commit(
        &self,
        content: PartialContent,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), CacheError> {
        let entry = &self.cache.entry;
        let path = content.finish().await?;

        remove_if_exists(&entry.etag).await?;
        remove_if_exists(&entry.last_modified).await?;

        path.persist(&entry.cached).map_err(|e| {
            CacheError::io(format!("persisting {}", entry.cached.display()), e.error)
        })?;

        if let Some(etag) = etag {
            write_synced(&entry.etag, etag).await?;
        }
        if let Some(last_modified) = last_modified {
            write_synced(&entry.last_modified, last_modified).await?;
        }

        debug!("Committed cache entry {}", entry.cached.display());
        Ok(())
    }

    /// Delete content and validators; the lock file stays
    pub async fn destroy(&self) -> Result<(), CacheError> {
        let entry = &self.cache.entry;
        remove_if_exists(&entry.cached).await?;
        remove_if_exists(&entry.etag).await?;
        remove_if_exists(&entry.last_modified).await?;

        debug!("Destroyed cache entry {}", entry.cached.display());
        Ok(())
    }
}

/// Content being downloaded, not yet visible to readers
#[derive(Debug)]
pub struct PartialContent {
    file: File,
    path: TempPath,
    written: u64,
}

impl PartialContent {
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), CacheError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| CacheError::io(format!("writing {}", self.path.display()), e))?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    /// Number of bytes written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    async fn finish(mut self) -> Result<TempPath, CacheError> {
        let sync = async {
            self.file.flush().await?;
            self.file.sync_all().await
        };
        sync.await
            .map_err(|e| CacheError::io(format!("syncing {}", self.path.display()), e))?;
        Ok(self.path)
    }
}

async fn acquire(path: &Path, mode: LockMode) -> Result<std::fs::File, CacheError> {
    let lock_path = path.to_path_buf();
    let result = tokio::task::spawn_blocking(move || -> std::io::Result<std::fs::File> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&lock_path)?;
        match mode {
            LockMode::Shared => FileExt::lock_shared(&file)?,
            LockMode::Exclusive => FileExt::lock_exclusive(&file)?,
        }
        Ok(file)
    })
    .await
    .map_err(std::io::Error::other)
    .and_then(|result| result);

    result.map_err(|e| CacheError::io(format!("locking {}", path.display()), e))
}

async fn read_optional(path: &Path) -> Result<Option<String>, CacheError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(format!("reading {}", path.display()), e)),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), CacheError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(format!("removing {}", path.display()), e)),
    }
}

async fn write_synced(path: &Path, content: &str) -> Result<(), CacheError> {
    let write = async {
        let mut file = File::create(path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await
    };
    write
        .await
        .map_err(|e| CacheError::io(format!("writing {}", path.display()), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn key() -> CacheKey {
        CacheKey::new("http://foo-uri/")
    }

    async fn commit(cache: &FileCache, content: &[u8], etag: Option<&str>, last_modified: Option<&str>) {
        let guard = cache.lock_exclusive().await.unwrap();
        let mut partial = guard.begin_content().unwrap();
        partial.write(content).await.unwrap();
        guard.commit(partial, etag, last_modified).await.unwrap();
    }

    #[tokio::test]
    async fn open_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested/cache");

        let cache = FileCache::open(&root, key()).await.unwrap();

        assert!(root.is_dir());
        assert_eq!(cache.root(), root);
    }

    #[tokio::test]
    async fn commit_writes_content_and_validators() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();

        commit(&cache, b"foo-cached", Some("foo-etag"), Some("foo-last-modified")).await;

        let guard = cache.lock_shared().await.unwrap();
        assert!(guard.is_cached().await);
        assert_eq!(guard.etag().await.unwrap().as_deref(), Some("foo-etag"));
        assert_eq!(
            guard.last_modified().await.unwrap().as_deref(),
            Some("foo-last-modified")
        );
        assert_eq!(
            std::fs::read_to_string(guard.content_path()).unwrap(),
            "foo-cached"
        );
        assert_eq!(
            guard.content_path(),
            temp_dir.path().join(format!("{}.cached", key()))
        );
    }

    #[tokio::test]
    async fn commit_removes_validators_missing_from_new_response() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();

        commit(&cache, b"old", Some("old-etag"), Some("old-last-modified")).await;
        commit(&cache, b"new", None, Some("new-last-modified")).await;

        let guard = cache.lock_shared().await.unwrap();
        assert_eq!(guard.etag().await.unwrap(), None);
        assert_eq!(
            guard.last_modified().await.unwrap().as_deref(),
            Some("new-last-modified")
        );
        assert_eq!(std::fs::read_to_string(guard.content_path()).unwrap(), "new");
    }

    #[tokio::test]
    async fn abandoned_content_leaves_entry_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();
        commit(&cache, b"old", Some("old-etag"), None).await;

        {
            let guard = cache.lock_exclusive().await.unwrap();
            let mut partial = guard.begin_content().unwrap();
            partial.write(b"half").await.unwrap();
            assert_eq!(partial.written(), 4);
        }

        let guard = cache.lock_shared().await.unwrap();
        assert_eq!(std::fs::read_to_string(guard.content_path()).unwrap(), "old");
        let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".part"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn destroy_removes_everything_but_the_lock_file() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();
        commit(&cache, b"foo-cached", Some("foo-etag"), Some("foo-last-modified")).await;

        cache.destroy().await.unwrap();

        let guard = cache.lock_shared().await.unwrap();
        assert!(!guard.is_cached().await);
        assert_eq!(guard.etag().await.unwrap(), None);
        assert_eq!(guard.last_modified().await.unwrap(), None);
        assert!(temp_dir.path().join(format!("{}.lock", key())).exists());
    }

    #[tokio::test]
    async fn destroy_of_missing_entry_is_a_no_op() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();
        cache.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn shared_locks_do_not_exclude_each_other() {
        let temp_dir = TempDir::new().unwrap();
        let cache = FileCache::open(temp_dir.path(), key()).await.unwrap();
        let other = FileCache::open(temp_dir.path(), key()).await.unwrap();

        let _first = cache.lock_shared().await.unwrap();
        let second = tokio::time::timeout(Duration::from_secs(5), other.lock_shared()).await;

        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn exclusive_lock_waits_for_readers() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let cache = FileCache::open(&root, key()).await.unwrap();
        let reader = cache.lock_shared().await.unwrap();

        let writer = Arc::new(FileCache::open(&root, key()).await.unwrap());
        let task = {
            let writer = writer.clone();
            tokio::spawn(async move {
                let guard = writer.lock_exclusive().await.unwrap();
                let mut partial = guard.begin_content().unwrap();
                partial.write(b"written").await.unwrap();
                guard.commit(partial, None, None).await.unwrap();
            })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!task.is_finished());
        assert!(!reader.is_cached().await);

        drop(reader);
        task.await.unwrap();
        assert!(cache.lock_shared().await.unwrap().is_cached().await);
    }

    #[tokio::test]
    async fn immutable_entry_reads_without_locking() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(format!("{}.cached", key())),
            "foo-stashed",
        )
        .unwrap();

        let entry = ImmutableEntry::new(temp_dir.path(), &key());
        assert!(entry.is_cached().await);
        assert!(entry.open_content().await.unwrap().is_some());
        assert!(!temp_dir.path().join(format!("{}.lock", key())).exists());
    }

    #[tokio::test]
    async fn immutable_entry_in_missing_root_is_not_cached() {
        let temp_dir = TempDir::new().unwrap();
        let entry = ImmutableEntry::new(&temp_dir.path().join("missing"), &key());
        assert!(!entry.is_cached().await);
        assert!(entry.open_content().await.unwrap().is_none());
    }
}
