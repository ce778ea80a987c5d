//! Connector contract shared by sources and destinations.
//!
//! Platform connectors implement:
//!
//! - [`Target`]: the duplex base, a name plus the single network/DB primitive
//!   [`Target::call`]
//! - [`Source`]: pre-flight report and per-group export
//! - [`Destination`]: pre-flight report and per-group writes
//!
//! The core owns everything around them: batching, cursor pagination, the
//! chunk loop, dependency checks, per-resource failure isolation, and the
//! error/warning log ([`Diagnostics`]).

mod destination;
mod diagnostics;
mod source;

pub use destination::{Destination, Written};
pub(crate) use destination::{Importer, RetryPolicy};
pub use diagnostics::{Diagnostics, Exception, Warning};
pub use source::{export_chunked, paginate, Emitter, Source};
pub(crate) use source::run_export;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::error::{MigrateError, Result};
use crate::resource::{Chunk, ResourceType};

/// Pre-flight counts per resource type.
pub type ResourceCounts = BTreeMap<ResourceType, u64>;

/// Classification of a failed connector call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    /// The resource already exists; handled as an idempotent skip.
    Conflict,
    Forbidden,
    /// Validation failure; retrying will not help.
    Invalid,
    /// Timeouts, rate limits, 5xx; safe to retry.
    Transient,
    Other,
}

/// Error surfaced by a connector call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} ({kind:?}, code {code})")]
pub struct ConnectorError {
    pub kind: ErrorKind,
    pub code: u16,
    pub message: String,
}

impl ConnectorError {
    pub fn new(kind: ErrorKind, code: u16, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Classify by HTTP-style status code.
    pub fn from_status(code: u16, message: impl Into<String>) -> Self {
        let kind = match code {
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            401 | 403 => ErrorKind::Forbidden,
            400 | 422 => ErrorKind::Invalid,
            408 | 429 | 500..=599 => ErrorKind::Transient,
            _ => ErrorKind::Other,
        };
        Self::new(kind, code, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, 404, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, 409, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, 403, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, 400, message)
    }

    pub fn transient(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transient, code, message)
    }

    pub fn is_conflict(&self) -> bool {
        self.kind == ErrorKind::Conflict
    }

    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Request method for [`Target::call`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        };
        f.write_str(name)
    }
}

/// Opaque request for the connector's transport.
#[derive(Debug, Clone)]
pub struct CallRequest {
    pub method: Method,
    pub path: String,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl CallRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: BTreeMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Attach a chunk payload with its `Content-Range` header.
    pub fn chunk(self, chunk: &Chunk) -> Self {
        self.header("Content-Range", chunk.content_range())
            .body(chunk.data.clone())
    }
}

/// Response from [`Target::call`].
#[derive(Debug, Clone, Default)]
pub struct CallResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
}

impl CallResponse {
    pub fn ok(body: impl Into<Bytes>) -> Self {
        Self {
            status: 200,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Convert a non-2xx response into a classified error.
    pub fn error_for_status(self) -> std::result::Result<Self, ConnectorError> {
        if self.is_success() {
            Ok(self)
        } else {
            let message = String::from_utf8_lossy(&self.body).into_owned();
            Err(ConnectorError::from_status(self.status, message))
        }
    }
}

/// Duplex base every connector implements.
#[async_trait]
pub trait Target: Send + Sync {
    /// Connector name for logs and error messages.
    fn name(&self) -> &str;

    /// Sole network/DB primitive; opaque to the core.
    async fn call(&self, request: CallRequest) -> std::result::Result<CallResponse, ConnectorError>;

    /// [`Target::call`] with non-2xx responses turned into classified errors.
    async fn call_checked(
        &self,
        request: CallRequest,
    ) -> std::result::Result<CallResponse, ConnectorError> {
        self.call(request).await?.error_for_status()
    }
}

/// Optional single resource (plus dependents) a run is scoped to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootScope {
    pub id: String,
    pub resource_type: ResourceType,
}

impl RootScope {
    /// Build a scope from optional halves; one without the other is an error.
    pub fn from_parts(
        id: Option<String>,
        resource_type: Option<ResourceType>,
    ) -> Result<Option<Self>> {
        match (id, resource_type) {
            (Some(id), Some(resource_type)) => Ok(Some(Self { id, resource_type })),
            (None, None) => Ok(None),
            _ => Err(MigrateError::IncompleteRoot),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ConnectorError::from_status(404, "").kind, ErrorKind::NotFound);
        assert_eq!(ConnectorError::from_status(409, "").kind, ErrorKind::Conflict);
        assert_eq!(ConnectorError::from_status(403, "").kind, ErrorKind::Forbidden);
        assert_eq!(ConnectorError::from_status(401, "").kind, ErrorKind::Forbidden);
        assert_eq!(ConnectorError::from_status(422, "").kind, ErrorKind::Invalid);
        assert!(ConnectorError::from_status(503, "").is_retryable());
        assert!(ConnectorError::from_status(429, "").is_retryable());
        assert_eq!(ConnectorError::from_status(418, "").kind, ErrorKind::Other);
    }

    #[test]
    fn test_error_for_status() {
        let ok = CallResponse::ok("fine");
        assert!(ok.error_for_status().is_ok());

        let conflict = CallResponse {
            status: 409,
            body: Bytes::from_static(b"document already exists"),
            ..Default::default()
        };
        let err = conflict.error_for_status().unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.message, "document already exists");
    }

    #[test]
    fn test_chunk_request_carries_content_range() {
        let chunk = Chunk::new(Bytes::from_static(b"abc"), 3, 5, 6);
        let request = CallRequest::new(Method::Post, "/storage/buckets/b/files").chunk(&chunk);
        assert_eq!(request.headers["Content-Range"], "bytes 3-5/6");
        assert_eq!(request.body.as_ref(), b"abc");
    }

    #[test]
    fn test_root_scope_requires_both_halves() {
        assert_eq!(RootScope::from_parts(None, None).unwrap(), None);
        assert!(RootScope::from_parts(Some("db1".into()), Some(ResourceType::Database))
            .unwrap()
            .is_some());
        assert!(matches!(
            RootScope::from_parts(Some("db1".into()), None),
            Err(MigrateError::IncompleteRoot)
        ));
        assert!(RootScope::from_parts(None, Some(ResourceType::Bucket)).is_err());
    }
}
