//! Version parsing and wildcard resolution
//!
//! # Modules
//!
//! - [`tokenized`]: `Version` (catalog entry, ordered) and `VersionPattern` (requested, wildcarded)
//! - [`resolver`]: Selects the best catalog version for a pattern
//! - [`error`]: Parse errors

pub mod error;
pub mod resolver;
pub mod tokenized;

pub use error::VersionError;
pub use resolver::resolve;
pub use tokenized::{Version, VersionPattern, WILDCARD};
