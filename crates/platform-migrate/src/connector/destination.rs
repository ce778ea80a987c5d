//! Import side of the connector contract.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::{ConnectorError, Diagnostics, Exception, ResourceCounts, Target, Warning};
use crate::cache::CacheHandle;
use crate::resource::{Group, Resource, ResourceType, Sequence, Status};

/// Outcome of a successful destination write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Written {
    Done,
    /// Written with an advisory downgrade, e.g. an unsupported option dropped.
    Downgraded(String),
}

/// Platform the data is written to.
///
/// Each `import_*` call writes one resource. Chunked resources arrive once
/// per chunk in order; the first chunk's write should set `resource.id` to the
/// destination's id, which later chunks of the same resource then carry.
/// Return a conflict error for resources that already exist.
#[async_trait]
pub trait Destination: Target {
    /// Count existing resources per type, probing write permissions.
    async fn report(
        &self,
        types: &[ResourceType],
    ) -> std::result::Result<ResourceCounts, ConnectorError>;

    async fn import_auth(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        Err(unsupported(self.name(), resource))
    }

    async fn import_databases(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        Err(unsupported(self.name(), resource))
    }

    async fn import_storage(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        Err(unsupported(self.name(), resource))
    }

    async fn import_functions(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        Err(unsupported(self.name(), resource))
    }
}

fn unsupported(name: &str, resource: &Resource) -> ConnectorError {
    ConnectorError::invalid(format!(
        "{} does not support importing {}",
        name,
        resource.resource_type()
    ))
}

/// Retry settings for transient destination failures.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// Per-batch counters returned by [`Importer::import`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct ImportStats {
    pub imported: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Writes batches one resource at a time, isolating failures per resource.
pub(crate) struct Importer {
    destination: Arc<dyn Destination>,
    cache: CacheHandle,
    diagnostics: Diagnostics,
    retry: RetryPolicy,
    /// Chunked resources whose first chunk hit a conflict.
    skipped_chunks: HashSet<(ResourceType, Sequence)>,
    /// Chunked resources with a failed chunk; later chunks are not sent.
    failed_chunks: HashSet<(ResourceType, Sequence)>,
    /// Advisories from chunks written so far, settled on the terminal chunk.
    downgraded_chunks: HashMap<(ResourceType, Sequence), Vec<String>>,
}

impl Importer {
    pub fn new(
        destination: Arc<dyn Destination>,
        cache: CacheHandle,
        diagnostics: Diagnostics,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            destination,
            cache,
            diagnostics,
            retry,
            skipped_chunks: HashSet::new(),
            failed_chunks: HashSet::new(),
            downgraded_chunks: HashMap::new(),
        }
    }

    /// Import a batch in order, recording each resource's outcome in the cache.
    pub async fn import(&mut self, batch: &mut [Resource]) -> ImportStats {
        let mut stats = ImportStats::default();
        for resource in batch.iter_mut() {
            self.import_one(resource).await;
            match resource.status {
                Status::Success | Status::Warning | Status::Processing => stats.imported += 1,
                Status::Skip => stats.skipped += 1,
                Status::Error => stats.failed += 1,
                Status::Pending | Status::Disregarded => {}
            }
        }
        debug!(
            "Imported batch: {} written, {} skipped, {} failed",
            stats.imported, stats.skipped, stats.failed
        );
        stats
    }

    async fn import_one(&mut self, resource: &mut Resource) {
        resource.set_status(Status::Processing, "");

        if let Some(key) = self.chunk_key(resource) {
            if self.skipped_chunks.contains(&key) {
                resource.set_status(Status::Skip, "already exists at destination");
                self.finish_chunk(resource, key);
                self.cache.update(resource);
                return;
            }
            if self.failed_chunks.contains(&key) {
                resource.set_status(Status::Error, "an earlier chunk failed");
                self.finish_chunk(resource, key);
                self.cache.update(resource);
                return;
            }
            if let Err(message) = self.adopt_destination_id(resource) {
                self.fail(resource, message, 0);
                self.failed_chunks.insert(key);
                self.finish_chunk(resource, key);
                self.cache.update(resource);
                return;
            }
        }

        match self.write_with_retry(resource).await {
            Ok(written) => {
                if let Written::Downgraded(message) = &written {
                    warn!(
                        "{} {}: {}",
                        resource.resource_type(),
                        resource.original_id,
                        message
                    );
                }
                let warning = self.advisory(resource, written);
                if is_terminal(resource) && !warning.is_empty() {
                    self.diagnostics
                        .warn(Warning::for_resource(resource, &warning));
                }
                settle(resource, warning);
            }
            Err(e) if e.is_conflict() => {
                debug!(
                    "{} {} already exists, skipping",
                    resource.resource_type(),
                    resource.original_id
                );
                resource.set_status(Status::Skip, e.message);
                if let Some(key) = self.chunk_key(resource) {
                    self.skipped_chunks.insert(key);
                }
            }
            Err(e) => {
                self.fail(resource, e.message, e.code);
                if let Some(key) = self.chunk_key(resource) {
                    self.failed_chunks.insert(key);
                }
            }
        }

        if let Some(key) = self.chunk_key(resource) {
            self.finish_chunk(resource, key);
        }
        self.cache.update(resource);
    }

    fn chunk_key(&self, resource: &Resource) -> Option<(ResourceType, Sequence)> {
        resource.chunk()?;
        Some((resource.resource_type(), resource.sequence?))
    }

    /// Drop per-resource chunk state once the terminal chunk has been seen.
    fn finish_chunk(&mut self, resource: &Resource, key: (ResourceType, Sequence)) {
        if resource.chunk().map_or(false, |c| c.is_terminal()) {
            self.skipped_chunks.remove(&key);
            self.failed_chunks.remove(&key);
            self.downgraded_chunks.remove(&key);
        }
    }

    /// Advisory message of a write. A chunked resource accumulates the
    /// advisories of all its chunks so the terminal chunk reports them.
    fn advisory(&mut self, resource: &Resource, written: Written) -> String {
        let message = match written {
            Written::Done => None,
            Written::Downgraded(message) => Some(message),
        };
        let Some(key) = self.chunk_key(resource) else {
            return message.unwrap_or_default();
        };
        if let Some(message) = message {
            self.downgraded_chunks.entry(key).or_default().push(message);
        }
        self.downgraded_chunks
            .get(&key)
            .map(|messages| messages.join("; "))
            .unwrap_or_default()
    }

    /// Carry the destination id of the first chunk onto a later chunk.
    fn adopt_destination_id(&self, resource: &mut Resource) -> Result<(), String> {
        let Some(chunk) = resource.chunk() else {
            return Ok(());
        };
        if chunk.is_first() {
            return Ok(());
        }
        let start = chunk.start;
        let Some(sequence) = resource.sequence else {
            return Err("chunk was never cached".to_string());
        };

        match self.cache.chunk_progress(resource.resource_type(), sequence) {
            Some(progress) if progress.next_offset == start => {
                resource.id = progress.destination_id;
                Ok(())
            }
            Some(progress) => Err(format!(
                "chunk at byte {} is out of order, destination expects byte {}",
                start, progress.next_offset
            )),
            None => Err(format!(
                "chunk at byte {} arrived before the first chunk was written",
                start
            )),
        }
    }

    async fn write_with_retry(
        &self,
        resource: &mut Resource,
    ) -> std::result::Result<Written, ConnectorError> {
        let mut attempt = 0u32;
        loop {
            match self.dispatch(resource).await {
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    let delay = self.retry.backoff * 2u32.saturating_pow(attempt);
                    attempt += 1;
                    warn!(
                        "{} {}: {} (retry {}/{} in {:?})",
                        resource.resource_type(),
                        resource.original_id,
                        e.message,
                        attempt,
                        self.retry.attempts,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }

    async fn dispatch(
        &self,
        resource: &mut Resource,
    ) -> std::result::Result<Written, ConnectorError> {
        match resource.group() {
            Group::Auth => self.destination.import_auth(resource, &self.cache).await,
            Group::Databases => {
                self.destination
                    .import_databases(resource, &self.cache)
                    .await
            }
            Group::Storage => self.destination.import_storage(resource, &self.cache).await,
            Group::Functions => {
                self.destination
                    .import_functions(resource, &self.cache)
                    .await
            }
        }
    }

    fn fail(&self, resource: &mut Resource, message: String, code: u16) {
        error!(
            "Failed to import {} {}: {}",
            resource.resource_type(),
            resource.original_id,
            message
        );
        self.diagnostics
            .error(Exception::for_resource(resource, &message, code));
        resource.set_status(Status::Error, message);
    }
}

fn is_terminal(resource: &Resource) -> bool {
    resource.chunk().map_or(true, |c| c.is_terminal())
}

/// Final status of a written resource; non-terminal chunks stay in progress.
fn settle(resource: &mut Resource, warning: String) {
    if !is_terminal(resource) {
        resource.set_status(Status::Processing, warning);
        return;
    }
    if warning.is_empty() {
        resource.set_status(Status::Success, "");
    } else {
        resource.set_status(Status::Warning, warning);
    }
    if resource.chunk().is_some() {
        info!(
            "{} {} transferred",
            resource.resource_type(),
            resource.original_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::{CallRequest, CallResponse};
    use crate::resource::{Bucket, Chunk, Database, File, ParentRef};
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Destination that records every write and fails on request.
    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<String>>,
        conflict_ids: Vec<String>,
        fail_ids: Vec<String>,
        transient_failures: Mutex<u32>,
        /// Chunk start offsets written with an advisory.
        downgrade_at: Vec<u64>,
    }

    #[async_trait]
    impl Target for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn call(
            &self,
            _request: CallRequest,
        ) -> std::result::Result<CallResponse, ConnectorError> {
            Ok(CallResponse::ok(""))
        }
    }

    #[async_trait]
    impl Destination for Recorder {
        async fn report(
            &self,
            _types: &[ResourceType],
        ) -> std::result::Result<ResourceCounts, ConnectorError> {
            Ok(ResourceCounts::new())
        }

        async fn import_databases(
            &self,
            resource: &mut Resource,
            _cache: &CacheHandle,
        ) -> std::result::Result<Written, ConnectorError> {
            {
                let mut remaining = self.transient_failures.lock().unwrap();
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ConnectorError::transient(503, "unavailable"));
                }
            }
            if self.conflict_ids.contains(&resource.original_id) {
                return Err(ConnectorError::conflict("exists"));
            }
            if self.fail_ids.contains(&resource.original_id) {
                return Err(ConnectorError::invalid("bad name"));
            }
            self.writes.lock().unwrap().push(resource.original_id.clone());
            Ok(Written::Done)
        }

        async fn import_storage(
            &self,
            resource: &mut Resource,
            _cache: &CacheHandle,
        ) -> std::result::Result<Written, ConnectorError> {
            if let Some(chunk) = resource.chunk().cloned() {
                if chunk.is_first() {
                    resource.id = format!("dst-{}", resource.original_id);
                }
                self.writes
                    .lock()
                    .unwrap()
                    .push(format!("{}:{}", resource.id, chunk.content_range()));
                if self.downgrade_at.contains(&chunk.start) {
                    return Ok(Written::Downgraded(format!(
                        "checksum mismatch at byte {}",
                        chunk.start
                    )));
                }
            }
            Ok(Written::Done)
        }
    }

    fn importer(destination: Recorder) -> (Importer, Arc<Recorder>, CacheHandle, Diagnostics) {
        let destination = Arc::new(destination);
        let cache = CacheHandle::new();
        let diagnostics = Diagnostics::new();
        let importer = Importer::new(
            destination.clone(),
            cache.clone(),
            diagnostics.clone(),
            RetryPolicy {
                attempts: 2,
                backoff: Duration::from_millis(1),
            },
        );
        (importer, destination, cache, diagnostics)
    }

    fn databases(cache: &CacheHandle, ids: &[&str]) -> Vec<Resource> {
        let mut batch: Vec<Resource> = ids
            .iter()
            .map(|id| Resource::new(*id, Database::new(*id)))
            .collect();
        cache.add_all(&mut batch);
        batch
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let (mut importer, destination, cache, diagnostics) = importer(Recorder {
            conflict_ids: vec!["db2".into()],
            fail_ids: vec!["db3".into()],
            ..Default::default()
        });
        let mut batch = databases(&cache, &["db1", "db2", "db3", "db4"]);

        let stats = importer.import(&mut batch).await;

        assert_eq!(
            stats,
            ImportStats {
                imported: 2,
                skipped: 1,
                failed: 1
            }
        );
        let statuses: Vec<Status> = batch.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![Status::Success, Status::Skip, Status::Error, Status::Success]
        );
        assert_eq!(*destination.writes.lock().unwrap(), vec!["db1", "db4"]);
        assert_eq!(diagnostics.error_count(), 1);
        assert_eq!(diagnostics.errors()[0].code, 400);

        let cached = cache.find(ResourceType::Database, None, "db3").unwrap();
        assert_eq!(cached.status, Status::Error);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let (mut importer, destination, cache, diagnostics) = importer(Recorder {
            transient_failures: Mutex::new(2),
            ..Default::default()
        });
        let mut batch = databases(&cache, &["db1"]);

        importer.import(&mut batch).await;

        assert_eq!(batch[0].status, Status::Success);
        assert_eq!(destination.writes.lock().unwrap().len(), 1);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let (mut importer, _destination, cache, diagnostics) = importer(Recorder {
            transient_failures: Mutex::new(5),
            ..Default::default()
        });
        let mut batch = databases(&cache, &["db1"]);

        importer.import(&mut batch).await;

        assert_eq!(batch[0].status, Status::Error);
        assert_eq!(diagnostics.errors()[0].code, 503);
    }

    #[tokio::test]
    async fn test_unsupported_group_is_an_error() {
        let (mut importer, _destination, cache, diagnostics) = importer(Recorder::default());
        let mut batch = vec![Resource::new("f1", crate::resource::Function::new("fn", "node-18"))];
        cache.add_all(&mut batch);

        importer.import(&mut batch).await;

        assert_eq!(batch[0].status, Status::Error);
        assert!(diagnostics.errors()[0].message.contains("does not support"));
    }

    #[tokio::test]
    async fn test_chunks_carry_destination_id() {
        let (mut importer, destination, cache, _diagnostics) = importer(Recorder::default());
        let mut buckets = vec![Resource::new("b1", Bucket::new("Uploads"))];
        cache.add_all(&mut buckets);
        let parent = ParentRef::of(&buckets[0]).unwrap();

        let windows = [(0u64, 3u64), (4, 7), (8, 9)];
        for (start, end) in windows {
            let data = Bytes::from(vec![0u8; (end - start + 1) as usize]);
            let mut batch = vec![Resource::new(
                "f1",
                File::new(parent.clone(), "a.bin", Chunk::new(data, start, end, 10)),
            )];
            cache.add_all(&mut batch);
            importer.import(&mut batch).await;

            let expected = if end == 9 {
                Status::Success
            } else {
                Status::Processing
            };
            assert_eq!(batch[0].status, expected);
        }

        assert_eq!(
            *destination.writes.lock().unwrap(),
            vec![
                "dst-f1:bytes 0-3/10",
                "dst-f1:bytes 4-7/10",
                "dst-f1:bytes 8-9/10"
            ]
        );
        let file = cache
            .find(ResourceType::File, Some(&parent), "f1")
            .unwrap();
        assert_eq!(file.status, Status::Success);
        assert_eq!(file.id, "dst-f1");
    }

    #[tokio::test]
    async fn test_out_of_order_chunk_is_rejected() {
        let (mut importer, destination, cache, diagnostics) = importer(Recorder::default());
        let mut buckets = vec![Resource::new("b1", Bucket::new("Uploads"))];
        cache.add_all(&mut buckets);
        let parent = ParentRef::of(&buckets[0]).unwrap();

        let mut batch = vec![Resource::new(
            "f1",
            File::new(
                parent,
                "a.bin",
                Chunk::new(Bytes::from_static(b"abcd"), 4, 7, 10),
            ),
        )];
        cache.add_all(&mut batch);
        importer.import(&mut batch).await;

        assert_eq!(batch[0].status, Status::Error);
        assert!(destination.writes.lock().unwrap().is_empty());
        assert_eq!(diagnostics.error_count(), 1);
    }

    async fn import_file_in_chunks(
        importer: &mut Importer,
        cache: &CacheHandle,
    ) -> (ParentRef, Vec<Status>) {
        let mut buckets = vec![Resource::new("b1", Bucket::new("Uploads"))];
        cache.add_all(&mut buckets);
        let parent = ParentRef::of(&buckets[0]).unwrap();

        let mut statuses = Vec::new();
        for (start, end) in [(0u64, 3u64), (4, 7), (8, 9)] {
            let data = Bytes::from(vec![0u8; (end - start + 1) as usize]);
            let mut batch = vec![Resource::new(
                "f1",
                File::new(parent.clone(), "a.bin", Chunk::new(data, start, end, 10)),
            )];
            cache.add_all(&mut batch);
            importer.import(&mut batch).await;
            statuses.push(batch[0].status);
        }
        (parent, statuses)
    }

    #[tokio::test]
    async fn test_terminal_chunk_downgrade_keeps_written_data() {
        let (mut importer, destination, cache, diagnostics) = importer(Recorder {
            downgrade_at: vec![8],
            ..Default::default()
        });

        let (parent, statuses) = import_file_in_chunks(&mut importer, &cache).await;

        assert_eq!(
            statuses,
            vec![Status::Processing, Status::Processing, Status::Warning]
        );
        assert_eq!(destination.writes.lock().unwrap().len(), 3);
        let file = cache
            .find(ResourceType::File, Some(&parent), "f1")
            .unwrap();
        assert_eq!(file.status, Status::Warning);
        assert_eq!(file.message, "checksum mismatch at byte 8");
        assert_eq!(diagnostics.warning_count(), 1);
        assert_eq!(diagnostics.error_count(), 0);
    }

    #[tokio::test]
    async fn test_early_chunk_downgrade_reaches_final_status() {
        let (mut importer, _destination, cache, diagnostics) = importer(Recorder {
            downgrade_at: vec![0],
            ..Default::default()
        });

        let (parent, statuses) = import_file_in_chunks(&mut importer, &cache).await;

        assert_eq!(
            statuses,
            vec![Status::Processing, Status::Processing, Status::Warning]
        );
        let file = cache
            .find(ResourceType::File, Some(&parent), "f1")
            .unwrap();
        assert_eq!(file.status, Status::Warning);
        assert_eq!(file.id, "dst-f1");
        let warnings = diagnostics.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "checksum mismatch at byte 0");
    }
}
