//! Export side of the connector contract.
//!
//! A [`Source`] exports one group at a time and hands each batch to the
//! [`Emitter`]. The emitter owns the cross-cutting rules: unrequested types
//! are marked skipped, disregarded entries are dropped, children whose parent
//! is not cached are isolated as errors, and everything is cached before the
//! surviving batch is forwarded to the import stage.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::BTreeSet;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ConnectorError, Diagnostics, Exception, ResourceCounts, RootScope, Target};
use crate::cache::{CacheHandle, ResumePoint};
use crate::error::{MigrateError, Result};
use crate::resource::{Chunk, ChunkRanges, Group, Resource, ResourceType, Status};

/// Platform the data is read from.
///
/// Each `export_*` method receives the requested types of that group in
/// dependency order and must emit parents before their children. Groups a
/// source does not support keep the default no-op.
#[async_trait]
pub trait Source: Target {
    /// Count resources per type, probing permissions on the way.
    async fn report(
        &self,
        types: &[ResourceType],
    ) -> std::result::Result<ResourceCounts, ConnectorError>;

    async fn export_auth(
        &self,
        _batch_size: usize,
        _types: &[ResourceType],
        _emitter: &Emitter,
    ) -> Result<()> {
        Ok(())
    }

    async fn export_databases(
        &self,
        _batch_size: usize,
        _types: &[ResourceType],
        _emitter: &Emitter,
    ) -> Result<()> {
        Ok(())
    }

    async fn export_storage(
        &self,
        _batch_size: usize,
        _types: &[ResourceType],
        _emitter: &Emitter,
    ) -> Result<()> {
        Ok(())
    }

    async fn export_functions(
        &self,
        _batch_size: usize,
        _types: &[ResourceType],
        _emitter: &Emitter,
    ) -> Result<()> {
        Ok(())
    }
}

/// Batch sink handed to a [`Source`] during export.
pub struct Emitter {
    requested: BTreeSet<ResourceType>,
    root: Option<RootScope>,
    chunk_size: u64,
    cache: CacheHandle,
    diagnostics: Diagnostics,
    cancel: CancellationToken,
    tx: mpsc::Sender<Vec<Resource>>,
}

impl Emitter {
    pub(crate) fn new(
        requested: &[ResourceType],
        root: Option<RootScope>,
        chunk_size: u64,
        cache: CacheHandle,
        diagnostics: Diagnostics,
        cancel: CancellationToken,
        tx: mpsc::Sender<Vec<Resource>>,
    ) -> Self {
        Self {
            requested: requested.iter().copied().collect(),
            root,
            chunk_size: chunk_size.max(1),
            cache,
            diagnostics,
            cancel,
            tx,
        }
    }

    /// Scope the source should restrict itself to, if any.
    pub fn root(&self) -> Option<&RootScope> {
        self.root.as_ref()
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn is_requested(&self, resource_type: ResourceType) -> bool {
        self.requested.contains(&resource_type)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(MigrateError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Cache a batch and forward what should be imported.
    ///
    /// Every entry is cached, including pruned ones, so later children can
    /// resolve their parent. Entries a previous attempt already settled keep
    /// their cached state and are not forwarded.
    pub async fn emit(&self, batch: Vec<Resource>) -> Result<()> {
        self.check_cancelled()?;

        let mut forward = Vec::with_capacity(batch.len());
        for mut resource in batch {
            let resource_type = resource.resource_type();

            if !self.cache.has_dependencies(&resource) {
                let parent = resource
                    .parent()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "dependency".to_string());
                let message = format!("{} is not cached", parent);
                warn!("{} {}: {}", resource_type, resource.original_id, message);
                self.diagnostics
                    .error(Exception::for_resource(&resource, &message, 0));
                resource.set_status(Status::Error, message);
                self.cache.add(&mut resource);
                continue;
            }

            if let Some(sequence) = self.cache.is_settled(&resource) {
                debug!(
                    "{} {} already settled as #{}, passing through",
                    resource_type, resource.original_id, sequence
                );
                continue;
            }

            let requested = self.requested.contains(&resource_type);
            if !requested && resource.status != Status::Disregarded {
                resource.set_status(Status::Skip, "not requested");
            }
            self.cache.add(&mut resource);

            if requested && resource.status != Status::Disregarded {
                forward.push(resource);
            }
        }

        if forward.is_empty() {
            return Ok(());
        }
        debug!("Forwarding batch of {} resources", forward.len());
        self.tx
            .send(forward)
            .await
            .map_err(|_| MigrateError::Cancelled)
    }
}

/// Drive cursor pagination until a page comes back short.
///
/// `fetch` receives the id of the last resource of the previous page (none on
/// the first call) and the page size. Returns the number of resources fetched.
pub async fn paginate<F, Fut>(emitter: &Emitter, batch_size: usize, mut fetch: F) -> Result<u64>
where
    F: FnMut(Option<String>, usize) -> Fut + Send,
    Fut: Future<Output = Result<Vec<Resource>>> + Send,
{
    let batch_size = batch_size.max(1);
    let mut cursor: Option<String> = None;
    let mut total = 0u64;

    loop {
        emitter.check_cancelled()?;
        let page = fetch(cursor.take(), batch_size).await?;
        let len = page.len();
        total += len as u64;
        cursor = page.last().map(|r| r.original_id.clone());

        if len > 0 {
            emitter.emit(page).await?;
        }
        if len < batch_size {
            break;
        }
    }

    Ok(total)
}

/// Export one binary resource as a sequence of chunk resources.
///
/// `template` carries the metadata and a chunk descriptor holding the total
/// size; `read` returns the bytes of one inclusive `(start, end)` window.
/// Resumes after the last acknowledged chunk of a previous attempt. A failed
/// or short read is recorded against this resource only. Reading stops early
/// once the resource is cached as skipped or failed. Returns the number of
/// chunks emitted.
pub async fn export_chunked<R, Fut>(
    emitter: &Emitter,
    template: Resource,
    mut read: R,
) -> Result<u32>
where
    R: FnMut(u64, u64) -> Fut + Send,
    Fut: Future<Output = Result<Bytes>> + Send,
{
    let resource_type = template.resource_type();
    let size = template
        .chunk()
        .map(|c| c.size)
        .ok_or_else(|| MigrateError::Config(format!("{} is not a chunked type", resource_type)))?;

    let offset = match emitter
        .cache
        .resume_point(resource_type, template.parent(), &template.original_id)
    {
        ResumePoint::Start => 0,
        ResumePoint::From(offset) => {
            info!(
                "{} {}: resuming at byte {} of {}",
                resource_type, template.original_id, offset, size
            );
            offset
        }
        ResumePoint::Done => {
            debug!("{} {}: already transferred", resource_type, template.original_id);
            return Ok(0);
        }
    };

    let mut emitted = 0u32;
    for (start, end) in ChunkRanges::starting_at(size, emitter.chunk_size, offset) {
        emitter.check_cancelled()?;
        if offset == 0 && emitted > 0 && abandoned(emitter, &template) {
            debug!(
                "{} {}: not reading past byte {}",
                resource_type, template.original_id, start
            );
            return Ok(emitted);
        }

        let data = match read(start, end).await {
            Ok(data) => data,
            Err(MigrateError::Cancelled) => return Err(MigrateError::Cancelled),
            Err(e) => {
                fail_chunked(emitter, &template, format!("read failed at byte {}: {}", start, e));
                return Ok(emitted);
            }
        };

        let mut chunk = Chunk::new(data, start, end, size);
        let expected = chunk.expected_len();
        if chunk.data.len() as u64 != expected {
            fail_chunked(
                emitter,
                &template,
                format!(
                    "short read at byte {}: got {} of {} bytes",
                    start,
                    chunk.data.len(),
                    expected
                ),
            );
            return Ok(emitted);
        }

        let mut resource = template.clone();
        if let Some(slot) = resource.chunk_mut() {
            std::mem::swap(slot, &mut chunk);
        }
        emitter.emit(vec![resource]).await?;
        emitted += 1;
    }

    Ok(emitted)
}

/// Whether the first chunk emitted this run was skipped or failed.
fn abandoned(emitter: &Emitter, template: &Resource) -> bool {
    emitter
        .cache
        .find(template.resource_type(), template.parent(), &template.original_id)
        .is_some_and(|cached| matches!(cached.status, Status::Skip | Status::Error))
}

fn fail_chunked(emitter: &Emitter, template: &Resource, message: String) {
    error!(
        "{} {}: {}",
        template.resource_type(),
        template.original_id,
        message
    );
    emitter
        .diagnostics
        .error(Exception::for_resource(template, &message, 0));
    let mut failed = template.clone();
    failed.set_status(Status::Error, message);
    emitter.cache.update(&mut failed);
}

/// Run every group's export for the requested types, in group order.
///
/// A group failing mid-export is recorded and the next group still runs.
/// Cancellation stops the whole export.
pub(crate) async fn run_export(
    source: &dyn Source,
    batch_size: usize,
    types: &[ResourceType],
    emitter: &Emitter,
) -> Result<()> {
    for group in Group::ALL {
        let group_types: Vec<ResourceType> = group
            .types()
            .iter()
            .copied()
            .filter(|t| types.contains(t))
            .collect();
        if group_types.is_empty() {
            continue;
        }
        emitter.check_cancelled()?;

        info!(
            "Exporting {} from {}: {}",
            group,
            source.name(),
            group_types
                .iter()
                .map(|t| t.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let result = match group {
            Group::Auth => source.export_auth(batch_size, &group_types, emitter).await,
            Group::Databases => {
                source
                    .export_databases(batch_size, &group_types, emitter)
                    .await
            }
            Group::Storage => source.export_storage(batch_size, &group_types, emitter).await,
            Group::Functions => {
                source
                    .export_functions(batch_size, &group_types, emitter)
                    .await
            }
        };

        match result {
            Ok(()) => {}
            Err(MigrateError::Cancelled) => return Err(MigrateError::Cancelled),
            Err(e) => {
                error!("Export of {} failed: {}", group, e);
                let code = match &e {
                    MigrateError::Connector { source, .. } => source.code,
                    MigrateError::Forbidden { .. } => 403,
                    _ => 0,
                };
                emitter
                    .diagnostics
                    .error(Exception::for_group(group, e.to_string(), code));
            }
        }
    }

    Ok(())
}
