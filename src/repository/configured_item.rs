//! Resolution of a component's configured version to a downloadable artifact

use serde::Deserialize;
use tracing::info;

use crate::repository::error::RepositoryError;
use crate::repository::index::RepositoryContext;
use crate::version::{Version, VersionPattern};

/// Per-component repository configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ItemConfiguration {
    /// Root template of the repository serving the component
    pub repository_root: Option<String>,
    /// Requested version, possibly wildcarded; absent means the latest
    pub version: Option<String>,
}

/// A resolved component version and where to download it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedItem {
    pub version: Version,
    pub uri: String,
}

/// Checks a requested version before the repository is consulted
pub type VersionValidator<'a> = &'a (dyn Fn(&VersionPattern) -> Result<(), RepositoryError> + Sync);

/// Find the version of `component` satisfying `configuration`
///
/// Every failure is reported as `"<component> error: <message>"`.
pub async fn find_item(
    component: &str,
    configuration: &ItemConfiguration,
    context: &RepositoryContext,
    validator: Option<VersionValidator<'_>>,
) -> Result<ResolvedItem, RepositoryError> {
    let item = resolve_item(configuration, context, validator)
        .await
        .map_err(|source| RepositoryError::Component {
            component: component.to_string(),
            source: Box::new(source),
        })?;

    info!("{} resolved to {} at {}", component, item.version, item.uri);
    Ok(item)
}

async fn resolve_item(
    configuration: &ItemConfiguration,
    context: &RepositoryContext,
    validator: Option<VersionValidator<'_>>,
) -> Result<ResolvedItem, RepositoryError> {
    let root = configuration
        .repository_root
        .as_deref()
        .ok_or(RepositoryError::MissingRepositoryRoot)?;
    let pattern = VersionPattern::parse_optional(configuration.version.as_deref())?;

    if let Some(validator) = validator {
        validator(&pattern)?;
    }

    let index = context.index(root).await?;
    let (version, uri) = index.find_item(Some(&pattern))?;
    Ok(ResolvedItem { version, uri })
}
