//! Version catalogs served by artifact repositories
//!
//! # Modules
//!
//! - [`configured_item`]: Resolves a component's configuration to a version and URI
//! - [`index`]: Repository indexes and the per-run context that loads them
//! - [`platform`]: Host platform and architecture detection
//! - [`error`]: Repository errors

pub mod configured_item;
pub mod error;
pub mod index;
pub mod platform;

pub use configured_item::{ItemConfiguration, ResolvedItem, VersionValidator, find_item};
pub use error::RepositoryError;
pub use index::{RepositoryContext, RepositoryIndex};
pub use platform::{HostProbe, SystemProbe};
