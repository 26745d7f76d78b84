//! Dependency version resolution and a filesystem-backed download cache
//!
//! - [`version`]: Version parsing, wildcard patterns and resolution
//! - [`repository`]: Repository indexes and configured component lookup
//! - [`cache`]: Conditional-GET download cache with offline fallback
//! - [`config`]: Configuration file and constants
//! - [`logging`]: Subscriber initialisation for the binary

pub mod cache;
pub mod config;
pub mod logging;
pub mod repository;
pub mod version;
