//! Transfer wiring: preflight, export/import pipeline and checkpoints.
//!
//! A [`Transfer`] pairs a [`Source`] with a [`Destination`] over a shared
//! [`CacheHandle`]. Export runs in a spawned task and hands batches to the
//! import stage through a bounded channel, so at most `read_ahead` batches
//! are in flight. Imports run in arrival order on the caller's task, which
//! keeps the chunks of a file in sequence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheHandle, StatusCounts};
use crate::config::TransferSettings;
use crate::connector::{
    run_export, Destination, Diagnostics, Emitter, Exception, Importer, ResourceCounts,
    RetryPolicy, RootScope, Source, Warning,
};
use crate::error::{MigrateError, Result};
use crate::resource::{Resource, ResourceType, Status, DEFAULT_CHUNK_SIZE};
use crate::state::{NoOpStateBackend, RunStatus, StateBackend, TransferState};

/// Transfer pipeline configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Resources per page and per emitted batch.
    pub batch_size: usize,
    /// Bytes per chunk for chunked resources.
    pub chunk_size: u64,
    /// Number of batches buffered between export and import.
    pub read_ahead: usize,
    /// Imported batches between state checkpoints.
    pub checkpoint_every: usize,
    /// Run the pre-flight report before transferring.
    pub preflight: bool,
    /// Retries for transient destination failures.
    pub retry_attempts: u32,
    /// Base backoff between retries, doubled per retry.
    pub retry_backoff: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self::from_settings(&TransferSettings::default())
    }
}

impl TransferConfig {
    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self {
            batch_size: settings.get_batch_size(),
            chunk_size: settings.get_chunk_size(),
            read_ahead: settings.get_read_ahead(),
            checkpoint_every: settings.get_checkpoint_every(),
            preflight: settings.preflight,
            retry_attempts: settings.get_retry_attempts(),
            retry_backoff: Duration::from_millis(settings.get_retry_backoff_ms()),
        }
    }
}

/// Pre-flight counts from both sides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreflightReport {
    pub source: ResourceCounts,
    pub destination: ResourceCounts,
}

/// One retained resource in a status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    pub resource: ResourceType,
    pub id: String,
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ReportEntry {
    fn of(resource: &Resource) -> Self {
        Self {
            resource: resource.resource_type(),
            id: resource.original_id.clone(),
            status: resource.status,
            message: resource.message.clone(),
        }
    }
}

/// Result of a transfer run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSummary {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished.
    pub completed_at: DateTime<Utc>,

    /// Batches imported, including those of resumed attempts.
    pub batches: u64,

    /// Resources (and chunks) written in this run.
    pub resources_imported: u64,

    /// Resources skipped because they already existed.
    pub resources_skipped: u64,

    /// Resources that failed to import in this run.
    pub resources_failed: u64,

    /// Recorded errors.
    pub errors: usize,

    /// Recorded warnings.
    pub warnings: usize,
}

impl TransferSummary {
    /// Convert the summary to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Moves resources from a source platform to a destination platform.
pub struct Transfer {
    source: Arc<dyn Source>,
    destination: Arc<dyn Destination>,
    config: TransferConfig,
    cache: CacheHandle,
    diagnostics: Diagnostics,
    state_backend: Arc<dyn StateBackend>,
    config_hash: String,
    state: Option<TransferState>,
}

impl Transfer {
    /// Create a transfer that keeps no persistent state.
    pub fn new(
        source: Arc<dyn Source>,
        destination: Arc<dyn Destination>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            destination,
            config,
            cache: CacheHandle::new(),
            diagnostics: Diagnostics::new(),
            state_backend: Arc::new(NoOpStateBackend::new()),
            config_hash: String::new(),
            state: None,
        }
    }

    /// Set the backend checkpoints are written to.
    pub fn with_state_backend(mut self, backend: Arc<dyn StateBackend>) -> Self {
        self.state_backend = backend;
        self
    }

    /// Bind persisted state to a configuration hash.
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Load the latest state for resume.
    ///
    /// Restores the cache and warnings of the previous attempt. Errors are
    /// not restored: every failed resource is attempted again.
    pub async fn resume(mut self) -> Result<Self> {
        self.state_backend.init().await?;
        if let Some(state) = self.state_backend.load_latest(&self.config_hash).await? {
            info!(
                "Resuming run {} ({}, {} batches imported) from {} state",
                state.run_id,
                state.status,
                state.batches,
                self.state_backend.backend_type()
            );
            self.cache = CacheHandle::from_snapshot(state.cache.clone());
            self.diagnostics = Diagnostics::restore(Vec::new(), state.warnings.clone());
            self.state = Some(state);
        }
        Ok(self)
    }

    /// Run id of the resumed state, if any.
    pub fn run_id(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.run_id.as_str())
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.cache
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Count what would be transferred and what already exists.
    ///
    /// Also probes permissions: a rejected probe is a
    /// [`MigrateError::Forbidden`] error.
    pub async fn report(&self, types: &[ResourceType]) -> Result<PreflightReport> {
        let source = self
            .source
            .report(types)
            .await
            .map_err(|e| MigrateError::connector(self.source.name(), e))?;
        let destination = self
            .destination
            .report(types)
            .await
            .map_err(|e| MigrateError::connector(self.destination.name(), e))?;

        for (resource_type, count) in &source {
            debug!(
                "Pre-flight: {} {} in {}, {} in {}",
                count,
                resource_type,
                self.source.name(),
                destination.get(resource_type).copied().unwrap_or(0),
                self.destination.name()
            );
        }
        Ok(PreflightReport {
            source,
            destination,
        })
    }

    /// Transfer the requested types, optionally scoped to one root resource.
    ///
    /// `on_batch` is called after every imported batch with the resources
    /// and their final statuses. Per-resource failures do not fail the run;
    /// they are recorded and queryable through [`Transfer::errors`].
    pub async fn run<F>(
        &mut self,
        types: &[ResourceType],
        root: Option<RootScope>,
        cancel: CancellationToken,
        mut on_batch: F,
    ) -> Result<TransferSummary>
    where
        F: FnMut(&[Resource]) + Send,
    {
        let started_at = Utc::now();
        let start = Instant::now();

        if self.config.preflight {
            let report = self.report(types).await?;
            let total: u64 = report.source.values().sum();
            info!("Pre-flight: {} resources to transfer", total);
        }

        self.state_backend.init().await?;
        let mut state = self.state.take().unwrap_or_else(|| {
            TransferState::new(uuid::Uuid::new_v4().to_string(), self.config_hash.clone())
        });
        state.status = RunStatus::Running;
        state.completed_at = None;

        info!(
            "Starting transfer run {}: {} -> {}",
            state.run_id,
            self.source.name(),
            self.destination.name()
        );
        if let Some(root) = &root {
            info!("Scoped to {} {}", root.resource_type, root.id);
        }

        // Stops the export task however this function returns.
        let pipeline = cancel.child_token();
        let _pipeline_guard = pipeline.clone().drop_guard();

        let (tx, mut rx) = mpsc::channel::<Vec<Resource>>(self.config.read_ahead.max(1));
        let emitter = Emitter::new(
            types,
            root,
            self.config.chunk_size,
            self.cache.clone(),
            self.diagnostics.clone(),
            pipeline.clone(),
            tx,
        );
        let source = self.source.clone();
        let export_types = types.to_vec();
        let batch_size = self.config.batch_size;
        let export_handle = tokio::spawn(async move {
            run_export(source.as_ref(), batch_size, &export_types, &emitter).await
        });

        let mut importer = Importer::new(
            self.destination.clone(),
            self.cache.clone(),
            self.diagnostics.clone(),
            RetryPolicy {
                attempts: self.config.retry_attempts,
                backoff: self.config.retry_backoff,
            },
        );
        let checkpoint_every = self.config.checkpoint_every.max(1) as u64;
        let mut imported = 0u64;
        let mut skipped = 0u64;
        let mut failed = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                batch = rx.recv() => batch,
            };
            let Some(mut batch) = next else {
                break;
            };

            let stats = importer.import(&mut batch).await;
            imported += stats.imported;
            skipped += stats.skipped;
            failed += stats.failed;
            state.batches += 1;
            on_batch(&batch);

            if state.batches % checkpoint_every == 0 {
                self.checkpoint(&mut state).await?;
            }
        }
        drop(rx);

        let export_result = export_handle
            .await
            .map_err(|e| MigrateError::Pipeline(e.to_string()))?;

        let status = match export_result {
            _ if cancel.is_cancelled() => RunStatus::Cancelled,
            Ok(()) => RunStatus::Completed,
            Err(MigrateError::Cancelled) => RunStatus::Cancelled,
            Err(e) => {
                warn!("Export ended with error: {}", e);
                RunStatus::Failed
            }
        };

        state.finish(status);
        self.checkpoint(&mut state).await?;

        let completed_at = state.completed_at.unwrap_or_else(Utc::now);
        let summary = TransferSummary {
            run_id: state.run_id.clone(),
            status,
            duration_seconds: start.elapsed().as_secs_f64(),
            started_at,
            completed_at,
            batches: state.batches,
            resources_imported: imported,
            resources_skipped: skipped,
            resources_failed: failed,
            errors: self.diagnostics.error_count(),
            warnings: self.diagnostics.warning_count(),
        };

        info!(
            "Transfer {} {} in {:.1}s: {} imported, {} skipped, {} failed, {} errors, {} warnings",
            summary.run_id,
            summary.status,
            summary.duration_seconds,
            summary.resources_imported,
            summary.resources_skipped,
            summary.resources_failed,
            summary.errors,
            summary.warnings
        );

        self.state = Some(state);
        Ok(summary)
    }

    async fn checkpoint(&self, state: &mut TransferState) -> Result<()> {
        state.cache = self.cache.snapshot();
        state.errors = self.diagnostics.errors();
        state.warnings = self.diagnostics.warnings();
        self.state_backend.save(state).await
    }

    pub fn errors(&self) -> Vec<Exception> {
        self.diagnostics.errors()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.diagnostics.warnings()
    }

    /// Retained resources, optionally filtered by status.
    pub fn report_entries(&self, statuses: &[Status]) -> Vec<ReportEntry> {
        report_entries(&self.cache, statuses)
    }

    /// Per-type status counters of bulk leaves.
    pub fn status_counters(&self) -> BTreeMap<ResourceType, StatusCounts> {
        self.cache.status_counters()
    }
}

/// Retained resources of a cache, in type then sequence order.
pub fn report_entries(cache: &CacheHandle, statuses: &[Status]) -> Vec<ReportEntry> {
    cache
        .get_all()
        .values()
        .filter_map(|view| view.objects())
        .flat_map(|objects| objects.values())
        .filter(|r| statuses.is_empty() || statuses.contains(&r.status))
        .map(ReportEntry::of)
        .collect()
}
