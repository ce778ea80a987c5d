//! Error and warning log accumulated over a run.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::resource::{Group, Resource, ResourceType};

/// A recorded per-resource (or per-group) failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exception {
    pub group: Group,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    pub id: String,
    pub message: String,
    pub code: u16,
}

impl Exception {
    pub fn for_resource(resource: &Resource, message: impl Into<String>, code: u16) -> Self {
        Self {
            group: resource.group(),
            resource_type: Some(resource.resource_type()),
            id: resource.original_id.clone(),
            message: message.into(),
            code,
        }
    }

    /// Failure that aborted a whole group export.
    pub fn for_group(group: Group, message: impl Into<String>, code: u16) -> Self {
        Self {
            group,
            resource_type: None,
            id: String::new(),
            message: message.into(),
            code,
        }
    }
}

/// A recorded advisory downgrade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub group: Group,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    pub id: String,
    pub message: String,
}

impl Warning {
    pub fn for_resource(resource: &Resource, message: impl Into<String>) -> Self {
        Self {
            group: resource.group(),
            resource_type: Some(resource.resource_type()),
            id: resource.original_id.clone(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
struct Log {
    errors: Vec<Exception>,
    warnings: Vec<Warning>,
}

/// Shared error/warning accumulator.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    inner: Arc<Mutex<Log>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with entries from a previous attempt.
    pub fn restore(errors: Vec<Exception>, warnings: Vec<Warning>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Log { errors, warnings })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Log> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn error(&self, exception: Exception) {
        self.lock().errors.push(exception);
    }

    pub fn warn(&self, warning: Warning) {
        self.lock().warnings.push(warning);
    }

    pub fn errors(&self) -> Vec<Exception> {
        self.lock().errors.clone()
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.lock().warnings.clone()
    }

    pub fn error_count(&self) -> usize {
        self.lock().errors.len()
    }

    pub fn warning_count(&self) -> usize {
        self.lock().warnings.len()
    }
}
