//! Storage Port for record documents
//!
//! A key-addressed document store with optimistic-concurrency revision
//! tokens. The record core only ever compares revisions for equality; the
//! backend is the sole arbiter of conflict detection.
//!
//! Three backends implement the same [`Database`] port:
//! - [`memory`]: in-process map, counter revisions (tests, dev mode)
//! - [`fs`]: one JSON file per record, revision persisted in the file
//! - [`mongo`]: document database, compare-and-set on a revision field

pub mod fs;
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::{Args, StorageBackend};
use crate::types::Result;

/// Persisted document body: attribute name to JSON value
pub type Doc = serde_json::Map<String, serde_json::Value>;

/// Opaque revision token issued by a storage backend.
///
/// Backends choose their own encoding (counter, ETag, whatever). Callers
/// compare revisions for equality only, never for ordering.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Revision(String);

impl Revision {
    pub fn new(token: impl Into<String>) -> Self {
        Revision(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One kind-scoped document namespace (a logical database)
#[async_trait]
pub trait Database: Send + Sync {
    /// Fetch a document and its current revision. `NotFound` on miss.
    async fn get(&self, id: &str) -> Result<(Doc, Revision)>;

    /// Insert a fresh document. Returns the assigned id and the initial
    /// revision. `Conflict` if the id already exists.
    async fn insert(&self, id: &str, doc: &Doc) -> Result<(String, Revision)>;

    /// Replace a document iff `rev` still matches the stored revision.
    /// Returns the new revision. `Conflict` on mismatch, `NotFound` if the
    /// document vanished.
    async fn save(&self, id: &str, rev: &Revision, doc: &Doc) -> Result<Revision>;

    /// Delete a document iff `rev` still matches. `Conflict` / `NotFound`
    /// as for `save`.
    async fn remove(&self, id: &str, rev: &Revision) -> Result<()>;

    /// Snapshot of every document in the namespace, ordered by id.
    async fn all(&self) -> Result<Vec<(String, Doc, Revision)>>;
}

enum Backend {
    Memory(memory::MemoryBackend),
    Filesystem(PathBuf),
    Mongo(mongo::MongoBackend),
}

/// Handle to a storage backend, vending kind-scoped [`Database`] namespaces.
///
/// Database handles are memoized per name, so repeated `database("users")`
/// calls share one namespace object.
pub struct Store {
    backend: Backend,
    prefix: String,
    databases: DashMap<String, Arc<dyn Database>>,
}

impl Store {
    /// In-process backend, nothing persisted
    pub fn memory() -> Store {
        Store::with_backend(Backend::Memory(memory::MemoryBackend::new()))
    }

    /// Filesystem backend rooted at `root`
    pub fn filesystem(root: impl Into<PathBuf>) -> Store {
        Store::with_backend(Backend::Filesystem(root.into()))
    }

    /// Document database backend. Connects and pings before returning.
    pub async fn mongodb(uri: &str, db_name: &str) -> Result<Store> {
        let backend = mongo::MongoBackend::connect(uri, db_name).await?;
        Ok(Store::with_backend(Backend::Mongo(backend)))
    }

    /// Open the backend selected by the configuration
    pub async fn open(args: &Args) -> Result<Store> {
        args.validate()?;
        let store = match args.storage {
            StorageBackend::Memory => Store::memory(),
            StorageBackend::Filesystem => {
                info!(root = %args.data_dir.display(), "Opening filesystem record store");
                Store::filesystem(&args.data_dir)
            }
            StorageBackend::Mongodb => {
                Store::mongodb(&args.mongodb_uri, &args.mongodb_db).await?
            }
        };
        Ok(store.with_prefix(&args.database_prefix))
    }

    fn with_backend(backend: Backend) -> Store {
        Store {
            backend,
            prefix: "seed".to_string(),
            databases: DashMap::new(),
        }
    }

    /// Replace the database-name prefix (default "seed")
    pub fn with_prefix(mut self, prefix: &str) -> Store {
        self.prefix = prefix.to_string();
        self.databases.clear();
        self
    }

    /// The kind-scoped namespace for `kind`, e.g. `database("users")` is the
    /// logical database "seed-users".
    pub fn database(&self, kind: &str) -> Arc<dyn Database> {
        let name = format!("{}-{}", self.prefix, kind);
        self.databases
            .entry(name.clone())
            .or_insert_with(|| match &self.backend {
                Backend::Memory(backend) => backend.database(&name),
                Backend::Filesystem(root) => Arc::new(fs::FsDatabase::new(root.join(&name))),
                Backend::Mongo(backend) => backend.database(&name),
            })
            .clone()
    }
}
