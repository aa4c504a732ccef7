//! "Build in progress" guard for artifact creation.
//!
//! [`BuildLock`] is the seam for a cross-process lock (an advisory lock or a
//! persisted build-state row). [`InProcessBuildLock`] only covers one
//! process: a second process creating the same artifact is not stopped.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Non-queuing, per-artifact exclusion for builds.
pub trait BuildLock: Send + Sync {
    /// Claim `artifact`, or `None` if a build of it is already running.
    fn try_acquire(&self, artifact: &str) -> Option<BuildGuard>;

    fn is_building(&self, artifact: &str) -> bool;
}

/// Held for the duration of one build; releases the claim on drop.
pub struct BuildGuard {
    artifact: String,
    release: Option<Box<dyn FnOnce(&str) + Send>>,
}

impl BuildGuard {
    pub fn new(artifact: impl Into<String>, release: impl FnOnce(&str) + Send + 'static) -> Self {
        Self {
            artifact: artifact.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn artifact(&self) -> &str {
        &self.artifact
    }
}

impl fmt::Debug for BuildGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildGuard")
            .field("artifact", &self.artifact)
            .finish()
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.artifact);
        }
    }
}

/// A set of artifact names behind a mutex.
#[derive(Debug, Clone, Default)]
pub struct InProcessBuildLock {
    building: Arc<Mutex<HashSet<String>>>,
}

impl InProcessBuildLock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl BuildLock for InProcessBuildLock {
    fn try_acquire(&self, artifact: &str) -> Option<BuildGuard> {
        let mut building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
        if !building.insert(artifact.to_string()) {
            return None;
        }
        let shared = Arc::clone(&self.building);
        Some(BuildGuard::new(artifact, move |name| {
            shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(name);
        }))
    }

    fn is_building(&self, artifact: &str) -> bool {
        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_claim_is_rejected_until_release() {
        let lock = InProcessBuildLock::new();
        let guard = lock.try_acquire("geo_exact").unwrap();
        assert_eq!(guard.artifact(), "geo_exact");
        assert!(lock.is_building("geo_exact"));
        assert!(lock.try_acquire("geo_exact").is_none());
        assert!(lock.try_acquire("geo_by_address").is_some());

        drop(guard);
        assert!(!lock.is_building("geo_exact"));
        assert!(lock.try_acquire("geo_exact").is_some());
    }

    #[test]
    fn clones_share_claims() {
        let lock = InProcessBuildLock::new();
        let other = lock.clone();
        let _guard = lock.try_acquire("families_clean").unwrap();
        assert!(other.try_acquire("families_clean").is_none());
    }
}
