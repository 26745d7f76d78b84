use thiserror::Error;

use crate::cache::CacheError;
use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(
        "A repository root must be specified as a key-value pair of 'repository_root' to the URI of the repository."
    )]
    MissingRepositoryRoot,

    #[error("No default repository root is configured for {0}")]
    MissingDefaultRoot(String),

    #[error("Unable to determine platform")]
    UnknownPlatform,

    #[error("Unable to determine architecture")]
    UnknownArchitecture,

    #[error("Invalid repository index {uri}: {source}")]
    InvalidIndex {
        uri: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid location '{location}' in repository {root}: {source}")]
    InvalidLocation {
        root: String,
        location: String,
        #[source]
        source: url::ParseError,
    },

    #[error("No version resolvable for '{pattern}' in {}", available.join(", "))]
    NoMatch {
        pattern: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Rejected(String),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("{component} error: {source}")]
    Component {
        component: String,
        #[source]
        source: Box<RepositoryError>,
    },
}
