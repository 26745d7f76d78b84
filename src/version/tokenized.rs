//! Tokenized versions of the form `major.minor.micro_qualifier`
//!
//! Two types share one parser:
//! - [`Version`]: a concrete catalog entry. Wildcards are rejected and the type is totally ordered.
//! - [`VersionPattern`]: a requested version that may end in a `+` wildcard. Patterns are
//!   matched against versions but never ordered.
//!
//! Examples of valid input: `1.7.0`, `1.7.0_51`, `0.5.0_BUILD-20120731.141622-16`,
//! and for patterns additionally `+`, `1.+`, `1.7.+`, `1.7.0_+`, `1.7.0_5+`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::version::error::VersionError;

/// The wildcard token
pub const WILDCARD: char = '+';

/// Character ordering used when comparing qualifiers
const COLLATING_SEQUENCE: &str =
    "-.abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

const COMPONENT_COUNT: usize = 4;

/// The four positional components `(major, minor, micro, qualifier)`
#[derive(Debug, Clone, PartialEq, Eq)]
struct Components([Option<String>; COMPONENT_COUNT]);

impl Components {
    fn parse(version: &str, allow_wildcards: bool) -> Result<Self, VersionError> {
        let (major, tail) = major_or_minor_and_tail(Some(version))?;
        let (minor, tail) = major_or_minor_and_tail(tail)?;
        let (micro, qualifier) = micro_and_qualifier(tail)?;

        let components = Self([
            major.map(str::to_string),
            minor.map(str::to_string),
            micro.map(str::to_string),
            qualifier.map(str::to_string),
        ]);
        components.validate(version, allow_wildcards)?;
        Ok(components)
    }

    fn validate(&self, version: &str, allow_wildcards: bool) -> Result<(), VersionError> {
        let mut wildcarded = false;

        for value in self.0.iter().flatten() {
            if wildcarded {
                return Err(VersionError::invalid(
                    version,
                    "no characters are allowed after a wildcard",
                ));
            }
            if value.ends_with(WILDCARD) {
                if !allow_wildcards {
                    return Err(VersionError::invalid(
                        version,
                        "wildcards are not allowed in this context",
                    ));
                }
                wildcarded = true;
            }
        }

        if !wildcarded && self.len() < 3 {
            return Err(VersionError::invalid(version, "missing component"));
        }

        Ok(())
    }

    fn len(&self) -> usize {
        self.0.iter().flatten().count()
    }

    fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(|c| c.as_deref())
    }

    fn iter(&self) -> impl Iterator<Item = Option<&str>> {
        self.0.iter().map(|c| c.as_deref())
    }
}

/// Split off a major or minor component at the first `.`
fn major_or_minor_and_tail(s: Option<&str>) -> Result<(Option<&str>, Option<&str>), VersionError> {
    let Some(s) = s.filter(|s| !s.is_empty()) else {
        return Ok((None, None));
    };

    if s.ends_with('.') {
        return Err(VersionError::invalid(s, "must not end in '.'"));
    }
    if s.contains("..") || s.contains("._") {
        return Err(VersionError::invalid(s, "missing component"));
    }

    let (component, tail) = match s.split_once('.') {
        Some((component, tail)) => (component, Some(tail)),
        None => (s, None),
    };

    if component.is_empty() || !is_numeric_or_wildcard(component) {
        return Err(VersionError::InvalidMajorOrMinor(component.to_string()));
    }

    Ok((Some(component), tail))
}

/// Split the remainder into micro and qualifier at the first `_`
fn micro_and_qualifier(s: Option<&str>) -> Result<(Option<&str>, Option<&str>), VersionError> {
    let Some(s) = s.filter(|s| !s.is_empty()) else {
        return Ok((None, None));
    };

    if s.ends_with('_') {
        return Err(VersionError::invalid(s, "must not end in '_'"));
    }

    let (micro, qualifier) = match s.split_once('_') {
        Some((micro, qualifier)) => (micro, Some(qualifier)),
        None => (s, None),
    };

    if micro.is_empty() || !is_numeric_or_wildcard(micro) {
        return Err(VersionError::InvalidMicro(micro.to_string()));
    }
    if let Some(qualifier) = qualifier
        && !is_valid_qualifier(qualifier)
    {
        return Err(VersionError::InvalidQualifier(qualifier.to_string()));
    }

    Ok((Some(micro), qualifier))
}

fn is_numeric_or_wildcard(component: &str) -> bool {
    component == "+" || component.chars().all(|c| c.is_ascii_digit())
}

/// Qualifiers are letters, digits, `-` and `.`, optionally followed by a single trailing `+`
fn is_valid_qualifier(qualifier: &str) -> bool {
    let body = qualifier.strip_suffix(WILDCARD).unwrap_or(qualifier);
    body.chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
}

/// Compare two digit strings by numeric value without overflowing
fn compare_numeric(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn leading_digits(s: &str) -> &str {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(s.len(), |(i, _)| i);
    &s[..end]
}

fn collating_index(c: char) -> Option<usize> {
    COLLATING_SEQUENCE.find(c)
}

/// Qualifiers compare by numeric prefix, then character by character, then by length
fn compare_qualifiers(a: &str, b: &str) -> Ordering {
    compare_numeric(leading_digits(a), leading_digits(b))
        .then_with(|| {
            a.chars()
                .zip(b.chars())
                .map(|(x, y)| collating_index(x).cmp(&collating_index(y)))
                .find(|ordering| ordering.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.len().cmp(&b.len()))
}

/// A concrete version advertised by a repository index
#[derive(Debug, Clone)]
pub struct Version {
    raw: String,
    components: Components,
}

impl Version {
    /// Parse a catalog version; wildcards are rejected
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        Ok(Self {
            raw: version.to_string(),
            components: Components::parse(version, false)?,
        })
    }

    pub fn major(&self) -> Option<&str> {
        self.components.get(0)
    }

    pub fn minor(&self) -> Option<&str> {
        self.components.get(1)
    }

    pub fn micro(&self) -> Option<&str> {
        self.components.get(2)
    }

    pub fn qualifier(&self) -> Option<&str> {
        self.components.get(3)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        (0..3)
            .map(|i| {
                compare_numeric(
                    self.components.get(i).unwrap_or(""),
                    other.components.get(i).unwrap_or(""),
                )
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or_else(|| {
                compare_qualifiers(
                    self.qualifier().unwrap_or(""),
                    other.qualifier().unwrap_or(""),
                )
            })
            // distinct spellings of the same number, e.g. `01` and `1`
            .then_with(|| self.raw.cmp(&other.raw))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other).is_eq()
    }
}

impl Eq for Version {}

/// A requested version that may contain a trailing wildcard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionPattern {
    raw: String,
    components: Components,
}

impl VersionPattern {
    /// Parse a candidate version; wildcards are allowed
    pub fn parse(version: &str) -> Result<Self, VersionError> {
        Ok(Self {
            raw: version.to_string(),
            components: Components::parse(version, true)?,
        })
    }

    /// Parse an optional candidate version, treating an absent value as `+`
    pub fn parse_optional(version: Option<&str>) -> Result<Self, VersionError> {
        match version {
            Some(version) => Self::parse(version),
            None => Ok(Self::wildcard()),
        }
    }

    /// The pattern matching every version
    pub fn wildcard() -> Self {
        Self {
            raw: WILDCARD.to_string(),
            components: Components([Some(WILDCARD.to_string()), None, None, None]),
        }
    }

    /// Whether any component ends in a wildcard
    pub fn is_wildcarded(&self) -> bool {
        self.components
            .iter()
            .flatten()
            .any(|c| c.ends_with(WILDCARD))
    }

    /// Check whether a catalog version satisfies this pattern
    ///
    /// A component ending in `+` matches any candidate component starting with the
    /// text before the `+`, and leaves every later position unconstrained. All other
    /// components, including absent ones, must match exactly.
    pub fn matches(&self, version: &Version) -> bool {
        for (pattern, candidate) in self.components.iter().zip(version.components.iter()) {
            match (pattern, candidate) {
                (Some(pattern), candidate) if pattern.ends_with(WILDCARD) => {
                    let prefix = &pattern[..pattern.len() - 1];
                    return candidate.is_some_and(|c| c.starts_with(prefix));
                }
                (pattern, candidate) if pattern != candidate => return false,
                _ => {}
            }
        }
        true
    }

    /// Reject patterns with more than `maximum_components` components
    pub fn check_size(&self, maximum_components: usize) -> Result<(), VersionError> {
        if self.components.len() > maximum_components {
            return Err(VersionError::TooManyComponents {
                version: self.raw.clone(),
            });
        }
        Ok(())
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl Default for VersionPattern {
    fn default() -> Self {
        Self::wildcard()
    }
}

impl FromStr for VersionPattern {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for VersionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
