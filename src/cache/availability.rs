//! Process-wide knowledge of whether remote downloads may be attempted
//!
//! A single [`InternetAvailability`] is created per run and shared (via `Arc`)
//! with every component that downloads. Once a request fails beyond its retry
//! budget the internet is marked unavailable, and later lookups go straight to
//! the caches.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, error};

use crate::config::{CacheConfig, RemoteDownloads};

#[derive(Debug, Clone, PartialEq, Eq)]
struct State {
    available: bool,
    reason: Option<String>,
}

#[derive(Debug)]
pub struct InternetAvailability {
    state: Mutex<State>,
}

impl InternetAvailability {
    pub fn new(available: bool) -> Self {
        Self {
            state: Mutex::new(State {
                available,
                reason: None,
            }),
        }
    }

    /// Initial availability from the `remote_downloads` setting
    pub fn from_config(config: &CacheConfig) -> Self {
        let availability = Self::new(true);
        if config.remote_downloads == RemoteDownloads::Disabled {
            availability.mark_unavailable("Remote downloads are disabled");
        }
        availability
    }

    pub fn is_available(&self) -> bool {
        self.lock().available
    }

    /// Reason recorded by the last [`mark_unavailable`](Self::mark_unavailable)
    pub fn reason(&self) -> Option<String> {
        self.lock().reason.clone()
    }

    pub fn set_available(&self) {
        let mut state = self.lock();
        state.available = true;
        state.reason = None;
    }

    pub fn mark_unavailable(&self, reason: impl Into<String>) {
        let reason = reason.into();
        error!("Internet unavailable: {}. Cached artifacts will be used.", reason);

        let mut state = self.lock();
        state.available = false;
        state.reason = Some(reason);
    }

    /// Temporarily force availability to `available`
    ///
    /// The previous state is restored when the returned guard is dropped,
    /// including when the scope unwinds.
    pub fn override_scope(&self, available: bool) -> AvailabilityOverride<'_> {
        let mut state = self.lock();
        let previous = state.clone();
        debug!("Overriding internet availability: {} -> {}", previous.available, available);
        state.available = available;

        AvailabilityOverride {
            availability: self,
            previous: Some(previous),
        }
    }

    /// Run `f` with availability temporarily forced to `available`
    pub fn with_override<T>(&self, available: bool, f: impl FnOnce() -> T) -> T {
        let _guard = self.override_scope(available);
        f()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for InternetAvailability {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Restores the overridden availability state on drop
#[derive(Debug)]
pub struct AvailabilityOverride<'a> {
    availability: &'a InternetAvailability,
    previous: Option<State>,
}

impl Drop for AvailabilityOverride<'_> {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            *self.availability.lock() = previous;
        }
    }
}
