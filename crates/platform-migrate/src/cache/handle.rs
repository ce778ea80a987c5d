//! Shared, lock-guarded access to the transfer cache.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Cache, CacheSnapshot, CacheView, ChunkProgress, ResumePoint, StatusCounts};
use crate::error::Result;
use crate::resource::{ParentRef, Resource, ResourceType, Sequence};

/// Capability handed to connectors and pipeline stages.
///
/// Every operation takes the lock for its whole check-then-act sequence, so
/// sequence allocation and counter increments are atomic per call. Lookups
/// return owned copies; nothing outside this module holds a reference into
/// the store.
#[derive(Debug, Clone, Default)]
pub struct CacheHandle {
    inner: Arc<Mutex<Cache>>,
}

impl CacheHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a handle from a persisted snapshot.
    pub fn from_snapshot(snapshot: CacheSnapshot) -> Self {
        Self {
            inner: Arc::new(Mutex::new(snapshot.into_cache())),
        }
    }

    // Bookkeeping must survive a panicked holder, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, Cache> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, resource: &mut Resource) -> Sequence {
        self.lock().add(resource)
    }

    pub fn add_all(&self, resources: &mut [Resource]) {
        self.lock().add_all(resources)
    }

    pub fn update(&self, resource: &mut Resource) {
        self.lock().update(resource)
    }

    pub fn update_all(&self, resources: &mut [Resource]) {
        self.lock().update_all(resources)
    }

    pub fn remove(&self, resource: &Resource) -> Result<()> {
        self.lock().remove(resource)
    }

    pub fn get(&self, resource_type: ResourceType) -> CacheView {
        self.lock().get(resource_type)
    }

    pub fn get_for(&self, resource: &Resource) -> CacheView {
        self.lock().get_for(resource)
    }

    pub fn get_all(&self) -> BTreeMap<ResourceType, CacheView> {
        self.lock().get_all()
    }

    pub fn wipe(&self) {
        self.lock().wipe()
    }

    pub fn resource(&self, resource_type: ResourceType, sequence: Sequence) -> Option<Resource> {
        self.lock().resource(resource_type, sequence).cloned()
    }

    pub fn resolve(&self, parent: &ParentRef) -> Option<Resource> {
        self.lock().resolve(parent).cloned()
    }

    pub fn find(
        &self,
        resource_type: ResourceType,
        parent: Option<&ParentRef>,
        original_id: &str,
    ) -> Option<Resource> {
        self.lock().find(resource_type, parent, original_id).cloned()
    }

    pub fn counts_for(&self, resource_type: ResourceType, parent: &ParentRef) -> StatusCounts {
        self.lock().counts_for(resource_type, parent)
    }

    pub fn status_counters(&self) -> BTreeMap<ResourceType, StatusCounts> {
        self.lock().status_counters()
    }

    pub fn has_dependencies(&self, resource: &Resource) -> bool {
        self.lock().has_dependencies(resource)
    }

    pub fn is_settled(&self, resource: &Resource) -> Option<Sequence> {
        self.lock().is_settled(resource)
    }

    pub fn chunk_progress(
        &self,
        resource_type: ResourceType,
        sequence: Sequence,
    ) -> Option<ChunkProgress> {
        self.lock().chunk_progress(resource_type, sequence).cloned()
    }

    pub fn resume_point(
        &self,
        resource_type: ResourceType,
        parent: Option<&ParentRef>,
        original_id: &str,
    ) -> ResumePoint {
        self.lock().resume_point(resource_type, parent, original_id)
    }

    /// Serializable copy of the current contents.
    pub fn snapshot(&self) -> CacheSnapshot {
        CacheSnapshot::capture(&self.lock())
    }
}
