use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected response status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("Content has invalid size. Was {actual}, should be {expected}.")]
    ContentIntegrity { actual: u64, expected: u64 },

    #[error("Redirect from {0} has no usable Location header")]
    InvalidRedirect(String),

    #[error("Too many redirects requesting {0}")]
    TooManyRedirects(String),

    #[error("Invalid URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unable to find cached file for {uri}")]
    NotCached {
        uri: String,
        #[source]
        source: Option<Box<CacheError>>,
    },

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to configure HTTP client: {0}")]
    Client(String),
}

impl CacheError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether the error is a network failure that consumes the retry budget
    ///
    /// Local filesystem errors and configuration errors are never retried.
    pub fn is_network_failure(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::UnexpectedStatus(_)
                | Self::ContentIntegrity { .. }
                | Self::InvalidRedirect(_)
                | Self::TooManyRedirects(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn network_failures_are_classified() {
        assert!(CacheError::UnexpectedStatus(StatusCode::INTERNAL_SERVER_ERROR).is_network_failure());
        assert!(
            CacheError::ContentIntegrity {
                actual: 7,
                expected: 10
            }
            .is_network_failure()
        );
        assert!(!CacheError::io("reading", std::io::Error::other("disk")).is_network_failure());
        assert!(
            !CacheError::NotCached {
                uri: "http://host/x".to_string(),
                source: None
            }
            .is_network_failure()
        );
    }

    #[test]
    fn not_cached_exposes_the_network_failure_as_source() {
        let err = CacheError::NotCached {
            uri: "http://host/x".to_string(),
            source: Some(Box::new(CacheError::ContentIntegrity {
                actual: 7,
                expected: 10,
            })),
        };

        assert_eq!(err.to_string(), "Unable to find cached file for http://host/x");
        assert_eq!(
            err.source().unwrap().to_string(),
            "Content has invalid size. Was 7, should be 10."
        );
    }
}
