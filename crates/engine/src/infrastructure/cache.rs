//! Process-wide lookup caches mirroring persisted rows.
//!
//! Explicit components with a load-on-miss and invalidation contract,
//! rather than ambient global maps. The package cache fronts the static
//! story graph; the plot-state cache keeps the hot row for active
//! sessions while writes still go through to the repo.

use std::sync::Arc;

use dashmap::DashMap;
use storyloom_domain::{PackageId, PlotState, SessionId, StoryPackage};

use crate::infrastructure::ports::{PackageRepo, PlotStateRepo, StoreError};

/// Read-through cache over a [`PackageRepo`].
pub struct PackageCache {
    inner: Arc<dyn PackageRepo>,
    entries: DashMap<PackageId, Arc<StoryPackage>>,
}

impl PackageCache {
    pub fn new(inner: Arc<dyn PackageRepo>) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
        }
    }

    /// Fetch a package, loading from the repo on miss.
    pub async fn get(&self, id: &PackageId) -> Result<Arc<StoryPackage>, StoreError> {
        if let Some(hit) = self.entries.get(id) {
            return Ok(Arc::clone(&hit));
        }
        let loaded = Arc::new(self.inner.get(id).await?);
        self.entries.insert(id.clone(), Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Drop a cached package (e.g., after an authoring update).
    pub fn invalidate(&self, id: &PackageId) {
        self.entries.remove(id);
    }
}

/// Write-through cache over a [`PlotStateRepo`].
///
/// Reads hit the cache for active sessions; every save goes to the repo
/// first and only updates the cache on success.
pub struct PlotStateCache {
    inner: Arc<dyn PlotStateRepo>,
    entries: DashMap<SessionId, PlotState>,
}

impl PlotStateCache {
    pub fn new(inner: Arc<dyn PlotStateRepo>) -> Self {
        Self {
            inner,
            entries: DashMap::new(),
        }
    }

    pub async fn load(&self, session_id: SessionId) -> Result<Option<PlotState>, StoreError> {
        if let Some(hit) = self.entries.get(&session_id) {
            return Ok(Some(hit.clone()));
        }
        let loaded = self.inner.load(session_id).await?;
        if let Some(state) = &loaded {
            self.entries.insert(session_id, state.clone());
        }
        Ok(loaded)
    }

    pub async fn save(&self, state: &PlotState) -> Result<(), StoreError> {
        self.inner.save(state).await?;
        self.entries.insert(state.session_id, state.clone());
        Ok(())
    }

    pub fn invalidate(&self, session_id: SessionId) {
        self.entries.remove(&session_id);
    }
}
