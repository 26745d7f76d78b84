//! Selection of the directories backing the download cache

use std::path::PathBuf;

use tracing::debug;

use crate::config::{GLOBAL_CACHE_ENV, STASH_ENV, temporary_cache_dir};

/// Which directory was chosen as the mutable root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Build-scoped cache supplied by the caller
    Application,
    /// Persistent cache shared between builds
    Global,
    /// Throwaway directory under the system temp dir
    Temporary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRoots {
    pub kind: CacheKind,
    /// Written by downloads, read first
    pub mutable: PathBuf,
    /// Read in order after the mutable root, never written
    pub immutable: Vec<PathBuf>,
}

/// Candidate directories, any of which may be absent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootSources {
    pub application: Option<PathBuf>,
    pub global: Option<PathBuf>,
    pub stash: Option<PathBuf>,
    pub resources: Option<PathBuf>,
}

impl RootSources {
    /// Global cache and stash from `BUILDPACK_CACHE` and `BUILDPACK_STASH`
    pub fn from_env(application: Option<PathBuf>, resources: Option<PathBuf>) -> Self {
        Self::from_lookup(application, resources, |name| std::env::var(name).ok())
    }

    pub fn from_lookup(
        application: Option<PathBuf>,
        resources: Option<PathBuf>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let dir = |name: &str| lookup(name).filter(|value| !value.is_empty()).map(PathBuf::from);

        Self {
            application,
            global: dir(GLOBAL_CACHE_ENV),
            stash: dir(STASH_ENV),
            resources,
        }
    }
}

impl CacheRoots {
    pub fn new(kind: CacheKind, mutable: impl Into<PathBuf>, immutable: Vec<PathBuf>) -> Self {
        Self {
            kind,
            mutable: mutable.into(),
            immutable,
        }
    }

    /// Choose the mutable root by precedence: application, global, temporary
    ///
    /// Immutable roots are, in order: bundled resources, the global cache when
    /// it lost to the application cache, then the stash.
    pub fn select(sources: RootSources) -> Self {
        let RootSources {
            application,
            global,
            stash,
            resources,
        } = sources;

        let (kind, mutable, demoted) = match (application, global) {
            (Some(application), global) => (CacheKind::Application, application, global),
            (None, Some(global)) => (CacheKind::Global, global, None),
            (None, None) => (CacheKind::Temporary, temporary_cache_dir(), None),
        };

        let mut immutable: Vec<PathBuf> = Vec::new();
        for root in [resources, demoted, stash].into_iter().flatten() {
            if root != mutable && !immutable.contains(&root) {
                immutable.push(root);
            }
        }

        debug!(
            "Selected {:?} cache {} with immutable roots {:?}",
            kind,
            mutable.display(),
            immutable
        );
        Self {
            kind,
            mutable,
            immutable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn path(s: &str) -> Option<PathBuf> {
        Some(PathBuf::from(s))
    }

    #[test]
    fn application_cache_wins_and_demotes_global() {
        let roots = CacheRoots::select(RootSources {
            application: path("/app/cache"),
            global: path("/global"),
            stash: path("/stash"),
            resources: path("/resources"),
        });

        assert_eq!(
            roots,
            CacheRoots::new(
                CacheKind::Application,
                "/app/cache",
                vec![
                    PathBuf::from("/resources"),
                    PathBuf::from("/global"),
                    PathBuf::from("/stash")
                ]
            )
        );
    }

    #[test]
    fn global_cache_is_used_without_application_cache() {
        let roots = CacheRoots::select(RootSources {
            global: path("/global"),
            stash: path("/stash"),
            ..RootSources::default()
        });

        assert_eq!(roots.kind, CacheKind::Global);
        assert_eq!(roots.mutable, PathBuf::from("/global"));
        assert_eq!(roots.immutable, vec![PathBuf::from("/stash")]);
    }

    #[test]
    fn temporary_cache_is_the_last_resort() {
        let roots = CacheRoots::select(RootSources {
            resources: path("/resources"),
            ..RootSources::default()
        });

        assert_eq!(roots.kind, CacheKind::Temporary);
        assert_eq!(roots.mutable, temporary_cache_dir());
        assert_eq!(roots.immutable, vec![PathBuf::from("/resources")]);
    }

    #[test]
    fn duplicate_roots_are_listed_once() {
        let roots = CacheRoots::select(RootSources {
            application: path("/shared"),
            global: path("/shared"),
            stash: path("/stash"),
            resources: path("/stash"),
        });

        assert_eq!(roots.mutable, PathBuf::from("/shared"));
        assert_eq!(roots.immutable, vec![PathBuf::from("/stash")]);
    }

    #[test]
    fn sources_from_lookup_ignore_empty_variables() {
        let sources = RootSources::from_lookup(None, None, |name| match name {
            GLOBAL_CACHE_ENV => Some("/global".to_string()),
            STASH_ENV => Some(String::new()),
            _ => None,
        });

        assert_eq!(sources.global, path("/global"));
        assert_eq!(sources.stash, None);
    }

    #[test]
    #[serial]
    fn sources_from_env_read_cache_variables() {
        // SAFETY: serialized with every other test touching the environment
        unsafe {
            std::env::set_var(GLOBAL_CACHE_ENV, "/global");
            std::env::remove_var(STASH_ENV);
        }
        let sources = RootSources::from_env(path("/app"), path("/resources"));
        unsafe { std::env::remove_var(GLOBAL_CACHE_ENV) };

        assert_eq!(
            sources,
            RootSources {
                application: path("/app"),
                global: path("/global"),
                stash: None,
                resources: path("/resources"),
            }
        );
    }
}
