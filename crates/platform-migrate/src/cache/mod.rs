//! Resumable store of everything a transfer has seen or written.
//!
//! The cache is the single source of truth for a job:
//!
//! - [`Sequence`] allocation (monotonic per type, never reused)
//! - parent lookups for dependency resolution
//! - idempotent status tracking
//! - bounded memory for bulk leaves, which are kept only as [`StatusCounts`]
//!   per parent collection
//! - acknowledged chunk progress, so a resumed run can continue a partially
//!   transferred file at the right offset and address the destination's id
//!
//! [`Cache`] itself is a plain single-owner structure. Connectors only ever see
//! it through [`CacheHandle`], which serializes every check-then-act operation
//! behind one lock.

mod handle;
mod snapshot;

pub use handle::CacheHandle;
pub use snapshot::{CacheSnapshot, ChunkProgressEntry, CounterEntry};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::error::{MigrateError, Result};
use crate::resource::{LogicalKey, ParentRef, Resource, ResourceType, Sequence, Status};

/// `{status -> count}` map kept for bulk-leaf types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCounts(BTreeMap<Status, u64>);

impl StatusCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self, status: Status) {
        *self.0.entry(status).or_insert(0) += 1;
    }

    /// Decrement a counter; returns false if it was already zero.
    pub fn decrement(&mut self, status: Status) -> bool {
        match self.0.get_mut(&status) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.0.remove(&status);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, status: Status) -> u64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    /// Number of distinct statuses seen.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Status, u64)> + '_ {
        self.0.iter().map(|(s, c)| (*s, *c))
    }

    /// Add every counter of `other` into `self`.
    pub fn merge(&mut self, other: &StatusCounts) {
        for (status, count) in other.iter() {
            *self.0.entry(status).or_insert(0) += count;
        }
    }
}

impl<const N: usize> From<[(Status, u64); N]> for StatusCounts {
    fn from(pairs: [(Status, u64); N]) -> Self {
        Self(pairs.into_iter().collect())
    }
}

/// What the cache holds for one resource type.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheView {
    /// Retained objects keyed by sequence.
    Objects(BTreeMap<Sequence, Resource>),
    /// Aggregated status counters of a bulk-leaf type.
    Counts(StatusCounts),
}

impl CacheView {
    /// Number of retained objects, or number of distinct statuses for counters.
    pub fn len(&self) -> usize {
        match self {
            CacheView::Objects(objects) => objects.len(),
            CacheView::Counts(counts) => counts.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn objects(&self) -> Option<&BTreeMap<Sequence, Resource>> {
        match self {
            CacheView::Objects(objects) => Some(objects),
            CacheView::Counts(_) => None,
        }
    }

    pub fn counts(&self) -> Option<&StatusCounts> {
        match self {
            CacheView::Counts(counts) => Some(counts),
            CacheView::Objects(_) => None,
        }
    }
}

/// Acknowledged progress of a chunked resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProgress {
    /// Offset the next chunk must start at.
    pub next_offset: u64,
    /// Id the destination allocated on the first chunk.
    pub destination_id: String,
    pub size: u64,
}

/// Where a chunked export should pick up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumePoint {
    /// Nothing acknowledged yet.
    Start,
    /// Continue at this byte offset.
    From(u64),
    /// Every chunk already landed.
    Done,
}

/// Store of resources keyed by type.
#[derive(Debug, Default)]
pub struct Cache {
    objects: HashMap<ResourceType, BTreeMap<Sequence, Resource>>,
    index: HashMap<ResourceType, HashMap<LogicalKey, Sequence>>,
    counters: HashMap<ResourceType, BTreeMap<Option<Sequence>, StatusCounts>>,
    next_sequence: HashMap<ResourceType, u64>,
    chunk_progress: HashMap<ResourceType, HashMap<Sequence, ChunkProgress>>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, assigning its sequence if it has none.
    ///
    /// Bulk leaves bump the counter of their current status instead of being
    /// stored. Binary payloads are stripped from the stored copy. A later chunk
    /// of a chunked resource keeps the stored status and destination id, so an
    /// in-flight file reads as in progress between chunks.
    pub fn add(&mut self, resource: &mut Resource) -> Sequence {
        let resource_type = resource.resource_type();
        let sequence = self.assign_sequence(resource);

        if resource_type.is_bulk_leaf() {
            self.count(resource);
            return sequence;
        }

        let later_chunk = resource.chunk().is_some_and(|c| !c.is_first());
        let objects = self.objects.entry(resource_type).or_default();
        if later_chunk {
            if let Some(stored) = objects.get_mut(&sequence) {
                let mut copy = resource.stripped();
                copy.id = std::mem::take(&mut stored.id);
                copy.status = stored.status;
                copy.message = std::mem::take(&mut stored.message);
                *stored = copy;
                return sequence;
            }
        }
        objects.insert(sequence, resource.stripped());

        sequence
    }

    pub fn add_all(&mut self, resources: &mut [Resource]) {
        for resource in resources {
            self.add(resource);
        }
    }

    /// Record the resource's current state.
    ///
    /// Bulk leaves append to the cumulative status log; prior counters are
    /// never decremented. Other types are added if absent, else overwritten.
    pub fn update(&mut self, resource: &mut Resource) {
        let resource_type = resource.resource_type();

        if resource_type.is_bulk_leaf() {
            self.assign_sequence(resource);
            self.count(resource);
            return;
        }

        let present = resource.sequence.is_some_and(|seq| {
            self.objects
                .get(&resource_type)
                .is_some_and(|objects| objects.contains_key(&seq))
        });
        if !present {
            self.add(resource);
        } else if let Some(sequence) = resource.sequence {
            self.objects
                .entry(resource_type)
                .or_default()
                .insert(sequence, resource.stripped());
        }

        if resource_type.is_chunked() {
            self.track_chunk(resource);
        }
    }

    pub fn update_all(&mut self, resources: &mut [Resource]) {
        for resource in resources {
            self.update(resource);
        }
    }

    /// Remove a cached resource. Removing an entry that was never cached is an error.
    pub fn remove(&mut self, resource: &Resource) -> Result<()> {
        let resource_type = resource.resource_type();
        let missing = || MigrateError::CacheMissing {
            resource_type: resource_type.to_string(),
            sequence: resource
                .sequence
                .map(|s| s.to_string())
                .unwrap_or_else(|| "(none)".to_string()),
        };

        if resource_type.is_bulk_leaf() {
            let parent = resource.parent().map(|p| p.sequence);
            let removed = self
                .counters
                .get_mut(&resource_type)
                .and_then(|by_parent| by_parent.get_mut(&parent))
                .is_some_and(|counts| counts.decrement(resource.status));
            return if removed { Ok(()) } else { Err(missing()) };
        }

        let sequence = resource.sequence.ok_or_else(missing)?;
        self.objects
            .get_mut(&resource_type)
            .and_then(|objects| objects.remove(&sequence))
            .ok_or_else(missing)?;

        if let Some(index) = self.index.get_mut(&resource_type) {
            index.retain(|_, seq| *seq != sequence);
        }
        if let Some(progress) = self.chunk_progress.get_mut(&resource_type) {
            progress.remove(&sequence);
        }
        Ok(())
    }

    /// Everything cached for one type.
    pub fn get(&self, resource_type: ResourceType) -> CacheView {
        if resource_type.is_bulk_leaf() {
            let mut total = StatusCounts::new();
            if let Some(by_parent) = self.counters.get(&resource_type) {
                for counts in by_parent.values() {
                    total.merge(counts);
                }
            }
            CacheView::Counts(total)
        } else {
            CacheView::Objects(self.objects.get(&resource_type).cloned().unwrap_or_default())
        }
    }

    /// Everything cached for the type of `resource`.
    pub fn get_for(&self, resource: &Resource) -> CacheView {
        self.get(resource.resource_type())
    }

    /// Every type that has at least one entry.
    pub fn get_all(&self) -> BTreeMap<ResourceType, CacheView> {
        ResourceType::ALL
            .into_iter()
            .map(|t| (t, self.get(t)))
            .filter(|(_, view)| !view.is_empty())
            .collect()
    }

    /// Drop every entry and reset allocators.
    pub fn wipe(&mut self) {
        self.objects.clear();
        self.index.clear();
        self.counters.clear();
        self.next_sequence.clear();
        self.chunk_progress.clear();
    }

    /// A retained resource by sequence.
    pub fn resource(&self, resource_type: ResourceType, sequence: Sequence) -> Option<&Resource> {
        self.objects.get(&resource_type)?.get(&sequence)
    }

    /// Resolve a parent reference to its cached entry.
    pub fn resolve(&self, parent: &ParentRef) -> Option<&Resource> {
        self.resource(parent.resource_type, parent.sequence)
    }

    /// Find a retained resource by its source-side id under an optional parent.
    pub fn find(
        &self,
        resource_type: ResourceType,
        parent: Option<&ParentRef>,
        original_id: &str,
    ) -> Option<&Resource> {
        let key = LogicalKey {
            parent: parent.map(|p| p.sequence),
            original_id: original_id.to_string(),
        };
        let sequence = self.index.get(&resource_type)?.get(&key)?;
        self.resource(resource_type, *sequence)
    }

    /// Counters of one bulk-leaf type under one parent collection.
    pub fn counts_for(&self, resource_type: ResourceType, parent: &ParentRef) -> StatusCounts {
        self.counters
            .get(&resource_type)
            .and_then(|by_parent| by_parent.get(&Some(parent.sequence)))
            .cloned()
            .unwrap_or_default()
    }

    /// Aggregated counters for every bulk-leaf type seen so far.
    pub fn status_counters(&self) -> BTreeMap<ResourceType, StatusCounts> {
        ResourceType::ALL
            .into_iter()
            .filter(|t| t.is_bulk_leaf())
            .filter_map(|t| self.get(t).counts().cloned().map(|c| (t, c)))
            .filter(|(_, counts)| !counts.is_empty())
            .collect()
    }

    /// Whether every parent of `resource` is already cached.
    pub fn has_dependencies(&self, resource: &Resource) -> bool {
        resource
            .kind
            .dependencies()
            .into_iter()
            .all(|parent| self.resolve(parent).is_some())
    }

    /// Whether a previous attempt already settled this logical resource.
    pub fn is_settled(&self, resource: &Resource) -> Option<Sequence> {
        let resource_type = resource.resource_type();
        if resource_type.is_bulk_leaf() {
            return None;
        }
        let sequence = *self.index.get(&resource_type)?.get(&resource.logical_key())?;
        let cached = self.resource(resource_type, sequence)?;
        cached.status.is_settled().then_some(sequence)
    }

    /// Acknowledged progress of a chunked resource.
    pub fn chunk_progress(
        &self,
        resource_type: ResourceType,
        sequence: Sequence,
    ) -> Option<&ChunkProgress> {
        self.chunk_progress.get(&resource_type)?.get(&sequence)
    }

    /// Where to resume exporting a chunked resource identified by parent and source id.
    pub fn resume_point(
        &self,
        resource_type: ResourceType,
        parent: Option<&ParentRef>,
        original_id: &str,
    ) -> ResumePoint {
        let Some(cached) = self.find(resource_type, parent, original_id) else {
            return ResumePoint::Start;
        };
        if cached.status.is_settled() {
            return ResumePoint::Done;
        }
        match cached
            .sequence
            .and_then(|seq| self.chunk_progress(resource_type, seq))
        {
            Some(progress) if progress.next_offset > 0 => ResumePoint::From(progress.next_offset),
            _ => ResumePoint::Start,
        }
    }

    fn assign_sequence(&mut self, resource: &mut Resource) -> Sequence {
        let resource_type = resource.resource_type();
        let bulk = resource_type.is_bulk_leaf();

        if let Some(sequence) = resource.sequence {
            self.reserve(resource_type, sequence);
            if !bulk {
                self.index
                    .entry(resource_type)
                    .or_default()
                    .entry(resource.logical_key())
                    .or_insert(sequence);
            }
            return sequence;
        }

        if !bulk {
            if let Some(existing) = self
                .index
                .get(&resource_type)
                .and_then(|index| index.get(&resource.logical_key()))
            {
                resource.sequence = Some(*existing);
                return *existing;
            }
        }

        let sequence = self.allocate(resource_type);
        resource.sequence = Some(sequence);
        if !bulk {
            self.index
                .entry(resource_type)
                .or_default()
                .insert(resource.logical_key(), sequence);
        }
        sequence
    }

    fn allocate(&mut self, resource_type: ResourceType) -> Sequence {
        let objects = self.objects.get(&resource_type);
        let next = self.next_sequence.entry(resource_type).or_insert(1);
        loop {
            let candidate = Sequence(*next);
            *next += 1;
            if objects.map_or(true, |o| !o.contains_key(&candidate)) {
                return candidate;
            }
            debug!("{}: sequence {} taken, retrying", resource_type, candidate);
        }
    }

    fn reserve(&mut self, resource_type: ResourceType, sequence: Sequence) {
        let next = self.next_sequence.entry(resource_type).or_insert(1);
        if *next <= sequence.0 {
            *next = sequence.0 + 1;
        }
    }

    fn count(&mut self, resource: &Resource) {
        let parent = resource.parent().map(|p| p.sequence);
        self.counters
            .entry(resource.resource_type())
            .or_default()
            .entry(parent)
            .or_default()
            .increment(resource.status);
    }

    fn track_chunk(&mut self, resource: &Resource) {
        let (Some(sequence), Some(chunk)) = (resource.sequence, resource.chunk()) else {
            return;
        };
        if !matches!(
            resource.status,
            Status::Processing | Status::Success | Status::Warning
        ) {
            return;
        }

        let progress = self
            .chunk_progress
            .entry(resource.resource_type())
            .or_default();
        match progress.get_mut(&sequence) {
            Some(existing) if chunk.start != existing.next_offset => {
                warn!(
                    "{} {}: acknowledged chunk at {} but expected offset {}",
                    resource.resource_type(),
                    resource.original_id,
                    chunk.start,
                    existing.next_offset
                );
            }
            Some(existing) => {
                existing.next_offset = chunk.next_offset();
                existing.destination_id = resource.id.clone();
            }
            None if chunk.is_first() => {
                progress.insert(
                    sequence,
                    ChunkProgress {
                        next_offset: chunk.next_offset(),
                        destination_id: resource.id.clone(),
                        size: chunk.size,
                    },
                );
            }
            None => {
                warn!(
                    "{} {}: acknowledged chunk at {} before the first chunk",
                    resource.resource_type(),
                    resource.original_id,
                    chunk.start
                );
            }
        }
    }
}
