use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version '{version}': {reason}")]
    Invalid { version: String, reason: String },

    #[error("Invalid major or minor version '{0}'")]
    InvalidMajorOrMinor(String),

    #[error("Invalid micro version '{0}'")]
    InvalidMicro(String),

    #[error("Invalid qualifier '{0}'")]
    InvalidQualifier(String),

    #[error("Malformed version {version}: too many version components")]
    TooManyComponents { version: String },
}

impl VersionError {
    pub(crate) fn invalid(version: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            version: version.to_string(),
            reason: reason.into(),
        }
    }
}
