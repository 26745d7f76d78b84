//! Wildcard version resolution
//!
//! Selects the maximum catalog version that satisfies a (possibly wildcarded)
//! requested version.

use tracing::warn;

use crate::version::tokenized::{Version, VersionPattern};

/// Resolve a requested version against a collection of catalog versions
///
/// # Arguments
/// * `pattern` - The requested version. `None` is treated as `+`.
/// * `candidates` - Catalog version strings. Entries that fail to parse are
///   discarded with a warning and never cause resolution to fail.
///
/// # Returns
/// The maximum matching version, or `None` if no candidate matches
pub fn resolve<S: AsRef<str>>(
    pattern: Option<&VersionPattern>,
    candidates: &[S],
) -> Option<Version> {
    let wildcard = VersionPattern::wildcard();
    let pattern = pattern.unwrap_or(&wildcard);

    candidates
        .iter()
        .filter_map(|candidate| parse_candidate(candidate.as_ref()))
        .filter(|version| pattern.matches(version))
        .max()
}

fn parse_candidate(candidate: &str) -> Option<Version> {
    Version::parse(candidate)
        .inspect_err(|e| warn!("Discarding illegal version {}: {}", candidate, e))
        .ok()
}
