//! Cache keys and URI redaction

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha256};

static CREDENTIALS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.-]*://)[^/?#@]*@").expect("valid credentials regex")
});

/// Identifies one cache slot: the SHA-256 hex digest of the full request URI
///
/// Credentials embedded in the URI are part of the digest, so two URIs that
/// differ only by credentials are cached separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(uri: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(uri.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of one of the entry's artifacts, e.g. `<key>.cached`
    pub fn file_name(&self, extension: &str) -> String {
        format!("{}.{}", self.0, extension)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Strip any `user:password@` from a URI so it can be logged
pub fn sanitize_uri(uri: &str) -> String {
    CREDENTIALS.replace(uri, "$scheme").into_owned()
}
