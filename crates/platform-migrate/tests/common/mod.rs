//! In-memory platforms used by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use platform_migrate::cache::CacheHandle;
use platform_migrate::connector::{
    export_chunked, paginate, CallRequest, CallResponse, ConnectorError, Destination, Emitter,
    ResourceCounts, Source, Target, Written,
};
use platform_migrate::resource::{
    Attribute, AttributeType, Bucket, Chunk, Collection, Database, Deployment, Document, EnvVar,
    File, Function, Membership, ParentRef, Resource, ResourceType, Team, User,
};
use platform_migrate::{MigrateError, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Paginate over a slice of source records by id.
fn page<T: Clone>(
    items: &[T],
    id: impl Fn(&T) -> &str,
    cursor: Option<String>,
    limit: usize,
) -> Vec<T> {
    let start = match cursor {
        Some(cursor) => items
            .iter()
            .position(|item| id(item) == cursor)
            .map_or(items.len(), |p| p + 1),
        None => 0,
    };
    items.iter().skip(start).take(limit).cloned().collect()
}

#[derive(Debug, Clone)]
pub struct MockCollection {
    pub id: String,
    pub name: String,
    pub attributes: Vec<String>,
    pub documents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct MockDatabase {
    pub id: String,
    pub name: String,
    pub collections: Vec<MockCollection>,
}

#[derive(Debug, Clone)]
pub struct MockFile {
    pub id: String,
    pub name: String,
    pub content: Bytes,
}

#[derive(Debug, Clone)]
pub struct MockBucket {
    pub id: String,
    pub name: String,
    pub files: Vec<MockFile>,
}

/// Source platform backed by plain vectors.
#[derive(Default)]
pub struct MemorySource {
    pub users: Vec<(String, String)>,
    pub teams: Vec<(String, String, Vec<String>)>,
    pub databases: Vec<MockDatabase>,
    pub buckets: Vec<MockBucket>,
    pub functions: Vec<(String, String)>,
    /// Code archives as `(function id, archive)`.
    pub deployments: Vec<(String, MockFile)>,
    /// Variables as `(function id, key, value)`.
    pub variables: Vec<(String, String, String)>,
    /// Reject the pre-flight probe.
    pub forbidden: bool,
    /// Fail the whole storage group with a transport error.
    pub storage_down: bool,
    /// Number of ranged reads served.
    pub reads: AtomicUsize,
}

impl MemorySource {
    /// Two databases with two collections each, plus users, a bucket and a
    /// function with one deployment.
    pub fn sample() -> Self {
        let collection = |db: &str, n: usize| MockCollection {
            id: format!("{}-c{}", db, n),
            name: format!("Collection {}", n),
            attributes: vec!["title".into(), "body".into()],
            documents: (0..5).map(|d| format!("{}-c{}-d{}", db, n, d)).collect(),
        };
        Self {
            users: vec![
                ("u1".into(), "alice@example.com".into()),
                ("u2".into(), "bob@example.com".into()),
            ],
            teams: vec![("t1".into(), "Editors".into(), vec!["u1".into(), "u2".into()])],
            databases: ["db1", "db2"]
                .iter()
                .map(|db| MockDatabase {
                    id: db.to_string(),
                    name: db.to_uppercase(),
                    collections: vec![collection(db, 1), collection(db, 2)],
                })
                .collect(),
            buckets: vec![MockBucket {
                id: "b1".into(),
                name: "Uploads".into(),
                files: vec![MockFile {
                    id: "f1".into(),
                    name: "small.txt".into(),
                    content: Bytes::from_static(b"hello world"),
                }],
            }],
            functions: vec![("fn1".into(), "node-18".into())],
            deployments: vec![(
                "fn1".into(),
                MockFile {
                    id: "dep1".into(),
                    name: "code.tar.gz".into(),
                    content: Bytes::from_static(b"export default () => 'ok';"),
                },
            )],
            variables: vec![("fn1".into(), "API_URL".into(), "https://api.example.com".into())],
            ..Default::default()
        }
    }

    fn counts(&self) -> ResourceCounts {
        let mut counts = BTreeMap::new();
        counts.insert(ResourceType::User, self.users.len() as u64);
        counts.insert(ResourceType::Team, self.teams.len() as u64);
        counts.insert(ResourceType::Database, self.databases.len() as u64);
        let collections = self.databases.iter().flat_map(|d| &d.collections);
        counts.insert(ResourceType::Collection, collections.clone().count() as u64);
        counts.insert(
            ResourceType::Document,
            collections.map(|c| c.documents.len() as u64).sum(),
        );
        counts.insert(ResourceType::Bucket, self.buckets.len() as u64);
        counts.insert(
            ResourceType::File,
            self.buckets.iter().map(|b| b.files.len() as u64).sum(),
        );
        counts.insert(ResourceType::Function, self.functions.len() as u64);
        counts.insert(ResourceType::Deployment, self.deployments.len() as u64);
        counts.insert(ResourceType::EnvVar, self.variables.len() as u64);
        counts
    }

    fn scoped(&self, emitter: &Emitter, resource_type: ResourceType, id: &str) -> bool {
        match emitter.root() {
            Some(root) if root.resource_type == resource_type => root.id == id,
            _ => true,
        }
    }

    fn cached_parent(
        emitter: &Emitter,
        resource_type: ResourceType,
        parent: Option<&ParentRef>,
        id: &str,
    ) -> Result<ParentRef> {
        let cached = emitter
            .cache()
            .find(resource_type, parent, id)
            .ok_or_else(|| MigrateError::Config(format!("{} {} not cached", resource_type, id)))?;
        ParentRef::of(&cached)
    }
}

impl MemorySource {
    /// Ranged reads over an in-memory blob.
    async fn export_content(
        &self,
        emitter: &Emitter,
        template: Resource,
        content: &Bytes,
    ) -> Result<u32> {
        let size = content.len() as u64;
        export_chunked(emitter, template, |start, end| {
            self.reads.fetch_add(1, Ordering::SeqCst);
            let data = if size == 0 {
                Bytes::new()
            } else {
                content.slice(start as usize..=end as usize)
            };
            async move { Ok(data) }
        })
        .await
    }
}

#[async_trait]
impl Target for MemorySource {
    fn name(&self) -> &str {
        "memory-source"
    }

    async fn call(
        &self,
        _request: CallRequest,
    ) -> std::result::Result<CallResponse, ConnectorError> {
        Ok(CallResponse::ok(""))
    }
}

#[async_trait]
impl Source for MemorySource {
    async fn report(
        &self,
        types: &[ResourceType],
    ) -> std::result::Result<ResourceCounts, ConnectorError> {
        if self.forbidden {
            return Err(ConnectorError::forbidden("missing scope databases.read"));
        }
        Ok(self
            .counts()
            .into_iter()
            .filter(|(t, _)| types.contains(t))
            .collect())
    }

    async fn export_auth(
        &self,
        batch_size: usize,
        types: &[ResourceType],
        emitter: &Emitter,
    ) -> Result<()> {
        paginate(emitter, batch_size, |cursor, limit| {
            let users: Vec<Resource> = page(&self.users, |u| u.0.as_str(), cursor, limit)
                .into_iter()
                .map(|(id, email)| Resource::new(id.clone(), User::new(id, Some(email))))
                .collect();
            async move { Ok(users) }
        })
        .await?;

        if !types.contains(&ResourceType::Team) && !types.contains(&ResourceType::Membership) {
            return Ok(());
        }
        let teams: Vec<Resource> = self
            .teams
            .iter()
            .map(|(id, name, _)| Resource::new(id.clone(), Team::new(name.clone())))
            .collect();
        emitter.emit(teams).await?;

        if types.contains(&ResourceType::Membership) {
            for (team_id, _, members) in &self.teams {
                let team = Self::cached_parent(emitter, ResourceType::Team, None, team_id)?;
                let mut batch = Vec::new();
                for user_id in members {
                    let user = Self::cached_parent(emitter, ResourceType::User, None, user_id)?;
                    batch.push(Resource::new(
                        format!("{}-{}", team_id, user_id),
                        Membership {
                            team: team.clone(),
                            user,
                            roles: vec!["member".into()],
                            confirmed: true,
                        },
                    ));
                }
                emitter.emit(batch).await?;
            }
        }
        Ok(())
    }

    async fn export_databases(
        &self,
        batch_size: usize,
        types: &[ResourceType],
        emitter: &Emitter,
    ) -> Result<()> {
        let databases: Vec<&MockDatabase> = self
            .databases
            .iter()
            .filter(|d| self.scoped(emitter, ResourceType::Database, &d.id))
            .collect();

        for chunk in databases.chunks(batch_size.max(1)) {
            let batch = chunk
                .iter()
                .map(|d| Resource::new(d.id.clone(), Database::new(d.name.clone())))
                .collect();
            emitter.emit(batch).await?;
        }

        let wants_children = types.iter().any(|t| *t != ResourceType::Database);
        if !wants_children {
            return Ok(());
        }

        for database in &databases {
            let db_ref = Self::cached_parent(emitter, ResourceType::Database, None, &database.id)?;
            let collections: Vec<Resource> = database
                .collections
                .iter()
                .map(|c| {
                    Resource::new(c.id.clone(), Collection::new(db_ref.clone(), c.name.clone()))
                })
                .collect();
            emitter.emit(collections).await?;

            for collection in &database.collections {
                let col_ref = Self::cached_parent(
                    emitter,
                    ResourceType::Collection,
                    Some(&db_ref),
                    &collection.id,
                )?;

                if types.contains(&ResourceType::Attribute) {
                    let attributes = collection
                        .attributes
                        .iter()
                        .map(|key| {
                            Resource::new(
                                format!("{}-{}", collection.id, key),
                                Attribute::new(col_ref.clone(), key.clone(), AttributeType::String),
                            )
                        })
                        .collect();
                    emitter.emit(attributes).await?;
                }

                if types.contains(&ResourceType::Document) {
                    let col_ref = col_ref.clone();
                    paginate(emitter, batch_size, |cursor, limit| {
                        let docs: Vec<Resource> =
                            page(&collection.documents, |d| d.as_str(), cursor, limit)
                                .into_iter()
                                .map(|id| {
                                    let mut data = serde_json::Map::new();
                                    data.insert("title".into(), id.clone().into());
                                    Resource::new(id, Document::new(col_ref.clone(), data))
                                })
                                .collect();
                        async move { Ok(docs) }
                    })
                    .await?;
                }
            }
        }
        Ok(())
    }

    async fn export_storage(
        &self,
        _batch_size: usize,
        types: &[ResourceType],
        emitter: &Emitter,
    ) -> Result<()> {
        if self.storage_down {
            return Err(MigrateError::connector(
                self.name(),
                ConnectorError::transient(503, "storage service unavailable"),
            ));
        }

        let buckets: Vec<&MockBucket> = self
            .buckets
            .iter()
            .filter(|b| self.scoped(emitter, ResourceType::Bucket, &b.id))
            .collect();
        let batch = buckets
            .iter()
            .map(|b| Resource::new(b.id.clone(), Bucket::new(b.name.clone())))
            .collect();
        emitter.emit(batch).await?;

        if !types.contains(&ResourceType::File) {
            return Ok(());
        }
        for bucket in buckets {
            let bucket_ref = Self::cached_parent(emitter, ResourceType::Bucket, None, &bucket.id)?;
            for file in &bucket.files {
                let size = file.content.len() as u64;
                let template = Resource::new(
                    file.id.clone(),
                    File::new(bucket_ref.clone(), file.name.clone(), Chunk::describe(size)),
                );
                self.export_content(emitter, template, &file.content).await?;
            }
        }
        Ok(())
    }

    async fn export_functions(
        &self,
        _batch_size: usize,
        types: &[ResourceType],
        emitter: &Emitter,
    ) -> Result<()> {
        let batch = self
            .functions
            .iter()
            .map(|(id, runtime)| {
                Resource::new(id.clone(), Function::new(id.clone(), runtime.clone()))
            })
            .collect();
        emitter.emit(batch).await?;

        if types.contains(&ResourceType::EnvVar) {
            let mut batch = Vec::new();
            for (function_id, key, value) in &self.variables {
                let function =
                    Self::cached_parent(emitter, ResourceType::Function, None, function_id)?;
                batch.push(Resource::new(
                    format!("{}-{}", function_id, key),
                    EnvVar {
                        function,
                        key: key.clone(),
                        value: value.clone(),
                    },
                ));
            }
            emitter.emit(batch).await?;
        }

        if types.contains(&ResourceType::Deployment) {
            for (function_id, archive) in &self.deployments {
                let function =
                    Self::cached_parent(emitter, ResourceType::Function, None, function_id)?;
                let size = archive.content.len() as u64;
                let template = Resource::new(
                    archive.id.clone(),
                    Deployment::new(function, Chunk::describe(size)),
                );
                self.export_content(emitter, template, &archive.content).await?;
            }
        }
        Ok(())
    }
}

/// Destination platform that records every write.
#[derive(Default)]
pub struct MemoryDestination {
    /// Existing resources by type and source id; writes to these conflict.
    pub existing: Mutex<HashSet<(ResourceType, String)>>,
    /// Ids whose write is rejected as invalid.
    pub fail_ids: HashSet<String>,
    /// Ids written with an advisory downgrade. Chunked resources report it
    /// on their last chunk, as a failed integrity check.
    pub downgrade_ids: HashSet<String>,
    /// Reject the pre-flight probe.
    pub forbidden: bool,
    /// Order of successful writes as `type:id`.
    pub writes: Mutex<Vec<String>>,
    /// Content-Range headers received per destination file id.
    pub ranges: Mutex<HashMap<String, Vec<String>>>,
    /// Assembled file content per destination file id.
    pub files: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryDestination {
    pub fn writes_of(&self, resource_type: ResourceType) -> Vec<String> {
        let prefix = format!("{}:", resource_type);
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter_map(|w| w.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn write(&self, resource: &Resource) -> std::result::Result<Written, ConnectorError> {
        let key = (resource.resource_type(), resource.original_id.clone());
        if self.fail_ids.contains(&resource.original_id) {
            return Err(ConnectorError::invalid(format!(
                "invalid {} {}",
                resource.resource_type(),
                resource.original_id
            )));
        }
        if !self.existing.lock().unwrap().insert(key) {
            return Err(ConnectorError::conflict("already exists"));
        }
        self.writes
            .lock()
            .unwrap()
            .push(format!("{}:{}", resource.resource_type(), resource.original_id));
        if self.downgrade_ids.contains(&resource.original_id) {
            Ok(Written::Downgraded("option not supported, dropped".into()))
        } else {
            Ok(Written::Done)
        }
    }

    fn write_chunk(&self, resource: &mut Resource) -> std::result::Result<Written, ConnectorError> {
        let Some(chunk) = resource.chunk().cloned() else {
            return self.write(resource);
        };
        if chunk.is_first() {
            self.write(resource)?;
            resource.id = format!("dst-{}", resource.original_id);
        }
        self.ranges
            .lock()
            .unwrap()
            .entry(resource.id.clone())
            .or_default()
            .push(chunk.content_range());
        self.files
            .lock()
            .unwrap()
            .entry(resource.id.clone())
            .or_default()
            .extend_from_slice(&chunk.data);
        if chunk.is_terminal() && self.downgrade_ids.contains(&resource.original_id) {
            return Ok(Written::Downgraded("checksum mismatch after last chunk".into()));
        }
        Ok(Written::Done)
    }
}

#[async_trait]
impl Target for MemoryDestination {
    fn name(&self) -> &str {
        "memory-destination"
    }

    async fn call(
        &self,
        _request: CallRequest,
    ) -> std::result::Result<CallResponse, ConnectorError> {
        Ok(CallResponse::ok(""))
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn report(
        &self,
        types: &[ResourceType],
    ) -> std::result::Result<ResourceCounts, ConnectorError> {
        if self.forbidden {
            return Err(ConnectorError::forbidden("missing scope databases.write"));
        }
        let mut counts = ResourceCounts::new();
        for (resource_type, _) in self.existing.lock().unwrap().iter() {
            if types.contains(resource_type) {
                *counts.entry(*resource_type).or_default() += 1;
            }
        }
        Ok(counts)
    }

    async fn import_auth(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        self.write(resource)
    }

    async fn import_databases(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        self.write(resource)
    }

    async fn import_storage(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        self.write_chunk(resource)
    }

    async fn import_functions(
        &self,
        resource: &mut Resource,
        _cache: &CacheHandle,
    ) -> std::result::Result<Written, ConnectorError> {
        self.write_chunk(resource)
    }
}
