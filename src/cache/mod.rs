//! Persistent cache of remote artifacts
//!
//! # Modules
//!
//! - [`download`]: `DownloadCache`, conditional GETs with retries and redirects
//! - [`file_cache`]: On-disk entries and their locks
//! - [`availability`]: Shared internet availability state
//! - [`roots`]: Selection of mutable and immutable cache directories
//! - [`http`]: HTTP client construction
//! - [`key`]: Cache keys and URI redaction

pub mod artifact;
pub mod availability;
pub mod download;
pub mod error;
pub mod file_cache;
pub mod http;
pub mod key;
pub mod roots;

#[cfg(test)]
pub use artifact::MockArtifactCache;
pub use artifact::{ArtifactCache, CachedArtifact};
pub use availability::{AvailabilityOverride, InternetAvailability};
pub use download::{DownloadCache, ResponseKind, RetryBudget};
pub use error::CacheError;
pub use http::{HttpSettings, ProxySettings, build_client};
pub use key::{CacheKey, sanitize_uri};
pub use roots::{CacheKind, CacheRoots, RootSources};
