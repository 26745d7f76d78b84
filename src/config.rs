use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

// =============================================================================
// Network-related constants
// =============================================================================

/// Number of retries after the first failed attempt before the internet is deemed unavailable
pub const RETRY_LIMIT: u32 = 5;

/// Maximum number of redirects followed for a single request
pub const REDIRECT_LIMIT: usize = 10;

/// Timeout for establishing a connection in milliseconds (60 seconds)
pub const CONNECT_TIMEOUT_MS: u64 = 60_000;

/// Timeout between reads of a response in milliseconds (60 seconds)
pub const READ_TIMEOUT_MS: u64 = 60_000;

// =============================================================================
// Environment variables
// =============================================================================

/// Root directory of the persistent global cache
pub const GLOBAL_CACHE_ENV: &str = "BUILDPACK_CACHE";

/// Root directory of the read-only pre-seeded stash
pub const STASH_ENV: &str = "BUILDPACK_STASH";

/// Log filter directive (tracing `EnvFilter` syntax)
pub const LOG_FILTER_ENV: &str = "BUILDPACK_CACHE_LOG";

const APP_NAME: &str = "buildpack-cache";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Top-level configuration file structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub repository: RepositoryConfig,
}

/// Download cache configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether remote downloads may be attempted at all
    pub remote_downloads: RemoteDownloads,
    /// Supplementary PEM bundle added to the platform CA roots
    pub ca_certificates: Option<PathBuf>,
    /// Client certificate presented to TLS servers that request one
    pub client_authentication: Option<ClientAuthentication>,
    /// Bundled, read-only cache root shipped alongside the tool
    pub resources_directory: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RemoteDownloads {
    #[default]
    Enabled,
    Disabled,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ClientAuthentication {
    pub certificate_location: PathBuf,
    pub private_key_location: PathBuf,
}

/// Repository configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Substituted for `{default.repository.root}` in repository roots
    pub default_repository_root: Option<String>,
}

impl Config {
    /// Load configuration from a YAML file, returning defaults if the file does not exist
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            debug!("No configuration file {} found", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        debug!("Configuration from {}: {:?}", path.display(), config);
        Ok(config)
    }
}

/// Returns the default configuration file path.
/// Uses $XDG_CONFIG_HOME/buildpack-cache/config.yml if XDG_CONFIG_HOME is set,
/// otherwise falls back to ~/.config/buildpack-cache/config.yml.
pub fn config_path() -> PathBuf {
    dir_with_env(
        std::env::var("XDG_CONFIG_HOME").ok(),
        dirs::home_dir(),
        ".config",
    )
    .join("config.yml")
}

/// Returns the default directory log files are written to.
/// Uses $XDG_DATA_HOME/buildpack-cache if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/buildpack-cache.
pub fn data_dir() -> PathBuf {
    dir_with_env(
        std::env::var("XDG_DATA_HOME").ok(),
        dirs::home_dir(),
        ".local/share",
    )
}

/// The log directory: an explicitly requested one, else [`data_dir`]
pub fn log_dir(requested: Option<PathBuf>) -> PathBuf {
    requested.unwrap_or_else(data_dir)
}

/// Returns the mutable cache root used when neither an application nor a global cache is available
pub fn temporary_cache_dir() -> PathBuf {
    std::env::temp_dir().join(APP_NAME)
}

fn dir_with_env(xdg_home: Option<String>, home_dir: Option<PathBuf>, home_relative: &str) -> PathBuf {
    let base = xdg_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(home_relative)))
        .unwrap_or_else(|| PathBuf::from("."));

    base.join(APP_NAME)
}
