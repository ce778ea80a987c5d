//! # platform-migrate
//!
//! Resumable, cross-platform data-migration engine core.
//!
//! Moves users, databases, storage and functions from one backend platform
//! to another through platform connectors:
//!
//! - **Resource model** covering every migratable kind, with per-resource status
//! - **Cache** that resolves parent/child dependencies and bounds memory for
//!   bulk documents with status counters
//! - **Connector contract** ([`Source`], [`Destination`]) with batching, cursor
//!   pagination and grouped export handled by the core
//! - **Chunked transfers** of files and deployments with `Content-Range` windows
//! - **Resume capability** via signed JSON state files
//!
//! ## Example
//!
//! ```rust,ignore
//! use platform_migrate::{Config, ConnectorCatalog, FileStateBackend};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::load("transfer.yaml")?;
//! let catalog = my_connectors::catalog();
//! let mut transfer = catalog
//!     .build_transfer(&config)?
//!     .with_state_backend(Arc::new(FileStateBackend::new("transfer.state.json")))
//!     .resume()
//!     .await?;
//! let types = config.transfer.resource_types()?;
//! let root = config.transfer.root_scope()?;
//! let summary = transfer.run(&types, root, CancellationToken::new(), |_| {}).await?;
//! println!("{} resources imported", summary.resources_imported);
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod connector;
pub mod error;
pub mod resource;
pub mod state;
pub mod transfer;

// Re-exports for convenient access
pub use cache::{Cache, CacheHandle, CacheSnapshot, CacheView, ResumePoint, StatusCounts};
pub use catalog::ConnectorCatalog;
pub use config::{Config, ConnectorConfig, TransferSettings};
pub use connector::{
    export_chunked, paginate, CallRequest, CallResponse, ConnectorError, Destination, Diagnostics,
    Emitter, ErrorKind, Exception, Method, ResourceCounts, RootScope, Source, Target, Warning,
    Written,
};
pub use error::{MigrateError, Result};
pub use resource::{Chunk, Group, ParentRef, Resource, ResourceKind, ResourceType, Sequence, Status};
pub use state::{FileStateBackend, NoOpStateBackend, RunStatus, StateBackend, TransferState};
pub use transfer::{PreflightReport, ReportEntry, Transfer, TransferConfig, TransferSummary};
