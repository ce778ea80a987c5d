//! Resource model shared by every connector.
//!
//! A [`Resource`] is one transferable unit: an identity, a schema object, a
//! document, or one chunk of a binary payload. Its variant-specific data lives
//! in the closed [`ResourceKind`] union so import/export dispatchers can match
//! exhaustively.
//!
//! Children never embed their parents. They hold a [`ParentRef`], a key into
//! the per-type arena of the cache, and a `ParentRef` can only be built from a
//! resource that already carries a cache [`Sequence`].

mod chunk;
mod kinds;

pub use chunk::{chunk_ranges, Chunk, ChunkRanges, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use kinds::{
    Attribute, AttributeType, Bucket, Collection, Database, Deployment, Document, EnvVar, File,
    Function, Index, IndexType, Membership, ResourceKind, Team, User,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{MigrateError, Result};

/// Top-level scheduling partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Group {
    Auth,
    Databases,
    Storage,
    Functions,
}

impl Group {
    /// Groups in export order.
    pub const ALL: [Group; 4] = [Group::Auth, Group::Databases, Group::Storage, Group::Functions];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Auth => "auth",
            Group::Databases => "databases",
            Group::Storage => "storage",
            Group::Functions => "functions",
        }
    }

    /// Resource types belonging to this group, in intra-group dependency order.
    pub fn types(self) -> &'static [ResourceType] {
        match self {
            Group::Auth => &[ResourceType::User, ResourceType::Team, ResourceType::Membership],
            Group::Databases => &[
                ResourceType::Database,
                ResourceType::Collection,
                ResourceType::Attribute,
                ResourceType::Index,
                ResourceType::Document,
            ],
            Group::Storage => &[ResourceType::Bucket, ResourceType::File],
            Group::Functions => &[
                ResourceType::Function,
                ResourceType::Deployment,
                ResourceType::EnvVar,
            ],
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable resource type name, the cache's top-level key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    User,
    Team,
    Membership,
    Database,
    #[serde(alias = "table")]
    Collection,
    #[serde(alias = "column")]
    Attribute,
    Index,
    #[serde(alias = "row")]
    Document,
    Bucket,
    File,
    Function,
    Deployment,
    EnvVar,
}

impl ResourceType {
    pub const ALL: [ResourceType; 13] = [
        ResourceType::User,
        ResourceType::Team,
        ResourceType::Membership,
        ResourceType::Database,
        ResourceType::Collection,
        ResourceType::Attribute,
        ResourceType::Index,
        ResourceType::Document,
        ResourceType::Bucket,
        ResourceType::File,
        ResourceType::Function,
        ResourceType::Deployment,
        ResourceType::EnvVar,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ResourceType::User => "user",
            ResourceType::Team => "team",
            ResourceType::Membership => "membership",
            ResourceType::Database => "database",
            ResourceType::Collection => "collection",
            ResourceType::Attribute => "attribute",
            ResourceType::Index => "index",
            ResourceType::Document => "document",
            ResourceType::Bucket => "bucket",
            ResourceType::File => "file",
            ResourceType::Function => "function",
            ResourceType::Deployment => "deployment",
            ResourceType::EnvVar => "env_var",
        }
    }

    /// Fixed type to group mapping used to partition a run.
    pub fn group(self) -> Group {
        match self {
            ResourceType::User | ResourceType::Team | ResourceType::Membership => Group::Auth,
            ResourceType::Database
            | ResourceType::Collection
            | ResourceType::Attribute
            | ResourceType::Index
            | ResourceType::Document => Group::Databases,
            ResourceType::Bucket | ResourceType::File => Group::Storage,
            ResourceType::Function | ResourceType::Deployment | ResourceType::EnvVar => {
                Group::Functions
            }
        }
    }

    /// Bulk leaves are cached only as status counters.
    pub fn is_bulk_leaf(self) -> bool {
        matches!(self, ResourceType::Document)
    }

    /// Types whose payload moves through the chunked transfer protocol.
    pub fn is_chunked(self) -> bool {
        matches!(self, ResourceType::File | ResourceType::Deployment)
    }

    /// Parse a list of type names, failing on the first unknown one.
    pub fn parse_list<S: AsRef<str>>(names: &[S]) -> Result<Vec<ResourceType>> {
        names.iter().map(|n| n.as_ref().parse()).collect()
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        let resource_type = match normalized.as_str() {
            "user" => ResourceType::User,
            "team" => ResourceType::Team,
            "membership" => ResourceType::Membership,
            "database" => ResourceType::Database,
            "collection" | "table" => ResourceType::Collection,
            "attribute" | "column" => ResourceType::Attribute,
            "index" => ResourceType::Index,
            "document" | "row" => ResourceType::Document,
            "bucket" => ResourceType::Bucket,
            "file" => ResourceType::File,
            "function" => ResourceType::Function,
            "deployment" => ResourceType::Deployment,
            "env_var" | "envvar" | "variable" => ResourceType::EnvVar,
            _ => {
                return Err(MigrateError::Config(format!(
                    "Unknown resource type: '{}'",
                    s
                )))
            }
        };
        Ok(resource_type)
    }
}

/// Per-resource transfer status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    #[default]
    Pending,
    Processing,
    Success,
    Error,
    Skip,
    Warning,
    /// Fetched only to satisfy a dependency; never sent to the destination.
    Disregarded,
}

impl Status {
    pub const ALL: [Status; 7] = [
        Status::Pending,
        Status::Processing,
        Status::Success,
        Status::Error,
        Status::Skip,
        Status::Warning,
        Status::Disregarded,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Processing => "processing",
            Status::Success => "success",
            Status::Error => "error",
            Status::Skip => "skip",
            Status::Warning => "warning",
            Status::Disregarded => "disregarded",
        }
    }

    /// Statuses a resumed run does not need to import again.
    pub fn is_settled(self) -> bool {
        matches!(self, Status::Success | Status::Warning)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        Status::ALL
            .into_iter()
            .find(|status| status.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| MigrateError::Config(format!("Invalid status: {}", s)))
    }
}

/// Cache-assigned key of a resource, unique per resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequence(pub u64);

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Key of a parent entry in the cache arena.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParentRef {
    pub resource_type: ResourceType,
    pub sequence: Sequence,
    /// Source-side id of the parent, kept for logging and lookups.
    pub id: String,
}

impl ParentRef {
    /// Reference a parent that has already been added to the cache.
    pub fn of(parent: &Resource) -> Result<Self> {
        let sequence = parent.sequence.ok_or_else(|| MigrateError::MissingParent {
            resource_type: parent.resource_type().to_string(),
            id: parent.id.clone(),
            parent: "(uncached)".to_string(),
        })?;
        Ok(Self {
            resource_type: parent.resource_type(),
            sequence,
            id: parent.original_id.clone(),
        })
    }
}

impl fmt::Display for ParentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}", self.resource_type, self.id, self.sequence)
    }
}

/// Identity of a logical resource inside its type: parent key plus source id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct LogicalKey {
    pub parent: Option<Sequence>,
    pub original_id: String,
}

/// A single transferable unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    /// Platform-visible id; a destination may reassign it on creation.
    pub id: String,

    /// Source-side id, preserved for audit.
    pub original_id: String,

    /// Cache key, assigned on first insertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<Sequence>,

    pub status: Status,

    #[serde(default)]
    pub message: String,

    #[serde(default)]
    pub permissions: Vec<String>,

    pub kind: ResourceKind,
}

impl Resource {
    /// Create a pending resource whose original id equals its id.
    pub fn new(id: impl Into<String>, kind: impl Into<ResourceKind>) -> Self {
        let id = id.into();
        Self {
            original_id: id.clone(),
            id,
            sequence: None,
            status: Status::Pending,
            message: String::new(),
            permissions: Vec::new(),
            kind: kind.into(),
        }
    }

    pub fn with_permissions(mut self, permissions: Vec<String>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn resource_type(&self) -> ResourceType {
        self.kind.resource_type()
    }

    pub fn group(&self) -> Group {
        self.resource_type().group()
    }

    pub fn parent(&self) -> Option<&ParentRef> {
        self.kind.parent()
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        self.kind.chunk()
    }

    pub fn chunk_mut(&mut self) -> Option<&mut Chunk> {
        self.kind.chunk_mut()
    }

    /// Set status and message together.
    pub fn set_status(&mut self, status: Status, message: impl Into<String>) {
        self.status = status;
        self.message = message.into();
    }

    /// Copy of this resource with any binary payload dropped.
    pub fn stripped(&self) -> Resource {
        let mut copy = self.clone();
        if let Some(chunk) = copy.chunk_mut() {
            chunk.data = bytes::Bytes::new();
        }
        copy
    }

    pub(crate) fn logical_key(&self) -> LogicalKey {
        LogicalKey {
            parent: self.parent().map(|p| p.sequence),
            original_id: self.original_id.clone(),
        }
    }
}
