//! Serializable form of the cache for resumable state files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::{Cache, ChunkProgress, StatusCounts};
use crate::resource::{Resource, ResourceType, Sequence};

/// Counters of one bulk-leaf parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterEntry {
    pub parent: Option<Sequence>,
    pub counts: StatusCounts,
}

/// Chunk progress of one chunked resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkProgressEntry {
    pub sequence: Sequence,
    #[serde(flatten)]
    pub progress: ChunkProgress,
}

/// Point-in-time copy of a [`Cache`]. Binary payloads are never included.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheSnapshot {
    #[serde(default)]
    pub objects: BTreeMap<ResourceType, Vec<Resource>>,

    #[serde(default)]
    pub counters: BTreeMap<ResourceType, Vec<CounterEntry>>,

    /// Next free sequence per type, so a restored allocator stays collision-free.
    #[serde(default)]
    pub next_sequence: BTreeMap<ResourceType, u64>,

    #[serde(default)]
    pub chunk_progress: BTreeMap<ResourceType, Vec<ChunkProgressEntry>>,
}

impl CacheSnapshot {
    pub(crate) fn capture(cache: &Cache) -> Self {
        let objects = cache
            .objects
            .iter()
            .filter(|(_, objects)| !objects.is_empty())
            .map(|(t, objects)| (*t, objects.values().cloned().collect()))
            .collect();

        let counters = cache
            .counters
            .iter()
            .map(|(t, by_parent)| {
                let entries = by_parent
                    .iter()
                    .map(|(parent, counts)| CounterEntry {
                        parent: *parent,
                        counts: counts.clone(),
                    })
                    .collect();
                (*t, entries)
            })
            .collect();

        let next_sequence = cache
            .next_sequence
            .iter()
            .map(|(t, next)| (*t, *next))
            .collect();

        let chunk_progress = cache
            .chunk_progress
            .iter()
            .map(|(t, progress)| {
                let mut entries: Vec<_> = progress
                    .iter()
                    .map(|(sequence, progress)| ChunkProgressEntry {
                        sequence: *sequence,
                        progress: progress.clone(),
                    })
                    .collect();
                entries.sort_by_key(|e| e.sequence);
                (*t, entries)
            })
            .collect();

        Self {
            objects,
            counters,
            next_sequence,
            chunk_progress,
        }
    }

    pub(crate) fn into_cache(self) -> Cache {
        let mut cache = Cache::new();

        for (resource_type, next) in self.next_sequence {
            cache.next_sequence.insert(resource_type, next);
        }

        for (_, resources) in self.objects {
            for mut resource in resources {
                // Re-adding with the stored sequence rebuilds the index and bumps the allocator.
                cache.add(&mut resource);
            }
        }

        for (resource_type, entries) in self.counters {
            let by_parent = cache.counters.entry(resource_type).or_default();
            for entry in entries {
                by_parent.entry(entry.parent).or_default().merge(&entry.counts);
            }
        }

        for (resource_type, entries) in self.chunk_progress {
            let progress = cache.chunk_progress.entry(resource_type).or_default();
            for entry in entries {
                progress.insert(entry.sequence, entry.progress);
            }
        }

        cache
    }

    /// Total retained objects plus bulk counters.
    pub fn len(&self) -> usize {
        self.objects.values().map(Vec::len).sum::<usize>()
            + self.counters.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
