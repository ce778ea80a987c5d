//! Variant payloads for every resource kind.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Chunk, ParentRef, ResourceType};

/// Closed union over resource kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceKind {
    User(User),
    Team(Team),
    Membership(Membership),
    Database(Database),
    Collection(Collection),
    Attribute(Attribute),
    Index(Index),
    Document(Document),
    Bucket(Bucket),
    File(File),
    Function(Function),
    Deployment(Deployment),
    EnvVar(EnvVar),
}

impl ResourceKind {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceKind::User(_) => ResourceType::User,
            ResourceKind::Team(_) => ResourceType::Team,
            ResourceKind::Membership(_) => ResourceType::Membership,
            ResourceKind::Database(_) => ResourceType::Database,
            ResourceKind::Collection(_) => ResourceType::Collection,
            ResourceKind::Attribute(_) => ResourceType::Attribute,
            ResourceKind::Index(_) => ResourceType::Index,
            ResourceKind::Document(_) => ResourceType::Document,
            ResourceKind::Bucket(_) => ResourceType::Bucket,
            ResourceKind::File(_) => ResourceType::File,
            ResourceKind::Function(_) => ResourceType::Function,
            ResourceKind::Deployment(_) => ResourceType::Deployment,
            ResourceKind::EnvVar(_) => ResourceType::EnvVar,
        }
    }

    /// The structural parent. Memberships report their team.
    pub fn parent(&self) -> Option<&ParentRef> {
        match self {
            ResourceKind::User(_)
            | ResourceKind::Team(_)
            | ResourceKind::Database(_)
            | ResourceKind::Bucket(_)
            | ResourceKind::Function(_) => None,
            ResourceKind::Membership(m) => Some(&m.team),
            ResourceKind::Collection(c) => Some(&c.database),
            ResourceKind::Attribute(a) => Some(&a.collection),
            ResourceKind::Index(i) => Some(&i.collection),
            ResourceKind::Document(d) => Some(&d.collection),
            ResourceKind::File(f) => Some(&f.bucket),
            ResourceKind::Deployment(d) => Some(&d.function),
            ResourceKind::EnvVar(e) => Some(&e.function),
        }
    }

    /// Every parent reference, including secondary ones such as a membership's user.
    pub fn dependencies(&self) -> Vec<&ParentRef> {
        match self {
            ResourceKind::Membership(m) => vec![&m.team, &m.user],
            other => other.parent().into_iter().collect(),
        }
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            ResourceKind::File(f) => Some(&f.chunk),
            ResourceKind::Deployment(d) => Some(&d.chunk),
            _ => None,
        }
    }

    pub fn chunk_mut(&mut self) -> Option<&mut Chunk> {
        match self {
            ResourceKind::File(f) => Some(&mut f.chunk),
            ResourceKind::Deployment(d) => Some(&mut d.chunk),
            _ => None,
        }
    }
}

macro_rules! impl_into_kind {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for ResourceKind {
                fn from(value: $variant) -> Self {
                    ResourceKind::$variant(value)
                }
            }
        )*
    };
}

impl_into_kind!(
    User, Team, Membership, Database, Collection, Attribute, Index, Document, Bucket, File,
    Function, Deployment, EnvVar,
);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    /// Opaque password hash, carried verbatim.
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub hash_algorithm: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub labels: Vec<String>,
}

impl User {
    pub fn new(name: impl Into<String>, email: Option<String>) -> Self {
        Self {
            name: name.into(),
            email,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    #[serde(default)]
    pub preferences: Map<String, Value>,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            preferences: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Membership {
    pub team: ParentRef,
    pub user: ParentRef,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Database {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
    pub database: ParentRef,
    pub name: String,
    #[serde(default)]
    pub document_security: bool,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Collection {
    pub fn new(database: ParentRef, name: impl Into<String>) -> Self {
        Self {
            database,
            name: name.into(),
            document_security: false,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Email,
    Ip,
    Url,
    Enum,
    Relationship,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub collection: ParentRef,
    pub key: String,
    pub attribute_type: AttributeType,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub default: Option<Value>,
    /// Allowed values for enum attributes.
    #[serde(default)]
    pub elements: Vec<String>,
    /// Related collection for relationship attributes.
    #[serde(default)]
    pub related_collection: Option<ParentRef>,
}

impl Attribute {
    pub fn new(
        collection: ParentRef,
        key: impl Into<String>,
        attribute_type: AttributeType,
    ) -> Self {
        Self {
            collection,
            key: key.into(),
            attribute_type,
            size: None,
            required: false,
            array: false,
            default: None,
            elements: Vec::new(),
            related_collection: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    Key,
    Unique,
    Fulltext,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub collection: ParentRef,
    pub key: String,
    pub index_type: IndexType,
    pub attributes: Vec<String>,
    #[serde(default)]
    pub orders: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub collection: ParentRef,
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Document {
    pub fn new(collection: ParentRef, data: Map<String, Value>) -> Self {
        Self { collection, data }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub max_file_size: u64,
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    #[serde(default)]
    pub compression: Option<String>,
    #[serde(default)]
    pub encryption: bool,
    #[serde(default)]
    pub antivirus: bool,
    #[serde(default)]
    pub file_security: bool,
}

impl Bucket {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct File {
    pub bucket: ParentRef,
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Content signature checked by the destination after the last chunk.
    #[serde(default)]
    pub signature: Option<String>,
    pub chunk: Chunk,
}

impl File {
    pub fn new(bucket: ParentRef, name: impl Into<String>, chunk: Chunk) -> Self {
        Self {
            bucket,
            name: name.into(),
            mime_type: None,
            signature: None,
            chunk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub runtime: String,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub commands: Option<String>,
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub timeout_seconds: u32,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub execute: Vec<String>,
}

impl Function {
    pub fn new(name: impl Into<String>, runtime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            runtime: runtime.into(),
            enabled: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    pub function: ParentRef,
    #[serde(default)]
    pub entrypoint: Option<String>,
    /// Activate the deployment once the last chunk lands.
    #[serde(default)]
    pub activate: bool,
    pub chunk: Chunk,
}

impl Deployment {
    pub fn new(function: ParentRef, chunk: Chunk) -> Self {
        Self {
            function,
            entrypoint: None,
            activate: false,
            chunk,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvVar {
    pub function: ParentRef,
    pub key: String,
    pub value: String,
}

fn default_true() -> bool {
    true
}
