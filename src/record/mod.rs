//! Record Core
//!
//! A [`Record`] is a persisted JSON entity with a lifecycle state machine,
//! lazy attribute normalization, dirty tracking, and a commit protocol that
//! drives the Storage Port. Each record kind is a unit type implementing
//! [`RecordKind`]; `users` and `tokens` are the built-in kinds, `records`
//! the generic fallback namespace.

pub mod generic;
pub mod token;
pub mod user;

pub use generic::{GenericKind, GenericRecord};
pub use token::{Token, TokenKind};
pub use user::{User, UserKind};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

use crate::store::{Doc, Revision, Store};
use crate::types::{GranaryError, Result};

/// Record lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Fresh instance, no storage counterpart yet
    New,
    /// Hydrated from storage (or just committed), revision known
    Ready,
    /// Reserved for an in-flight commit guard; nothing enters it today
    Committing,
    /// Removed or discarded. Terminal.
    Destroyed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Lifecycle::New => "new",
            Lifecycle::Ready => "ready",
            Lifecycle::Committing => "committing",
            Lifecycle::Destroyed => "destroyed",
        };
        f.write_str(name)
    }
}

/// Behavior of one record kind: its namespace, required keys, attribute
/// normalization, commit hooks, and JSON projection.
///
/// Normalization must be pure. Validation is expressed by returning an
/// error, never by handing back a patched-up invalid value.
#[async_trait]
pub trait RecordKind: Sized + Send + Sync + 'static {
    /// Kind-scoped database name ("users", "tokens", ...)
    const DATABASE: &'static str;

    /// Keys every record of this kind carries, seeded by `setup` when the
    /// caller omits them
    const REQUIRED_KEYS: &'static [&'static str] = &[];

    /// Normalize an attribute value (defaulting, coercion). `writing` is
    /// true when the value is being stored rather than read.
    fn normalize(key: &str, value: Value, writing: bool) -> Result<Value> {
        let _ = (key, writing);
        Ok(value)
    }

    /// Runs before the storage insert on create
    async fn will_create(record: &mut Record<Self>, store: &Store) -> Result<()> {
        let _ = (record, store);
        Ok(())
    }

    /// Runs after a successful storage insert on create
    async fn did_create(record: &mut Record<Self>, store: &Store) -> Result<()> {
        let _ = (record, store);
        Ok(())
    }

    /// Runs before the storage save on update
    async fn will_update(record: &mut Record<Self>, store: &Store) -> Result<()> {
        let _ = (record, store);
        Ok(())
    }

    /// Runs after a successful storage save on update
    async fn did_update(record: &mut Record<Self>, store: &Store) -> Result<()> {
        let _ = (record, store);
        Ok(())
    }

    /// Build the index/show JSON for a record of this kind. The default
    /// projection is every attribute, normalized, plus the self link.
    async fn project(record: &Record<Self>, acting: &User, store: &Store) -> Result<Value> {
        let _ = (acting, store);
        record.base_json()
    }
}

/// A persisted JSON entity of kind `K`
pub struct Record<K: RecordKind> {
    id: String,
    revision: Option<Revision>,
    attributes: Doc,
    normalized: DashMap<String, Value>,
    state: Lifecycle,
    dirty: bool,
    read_only: bool,
    _kind: PhantomData<K>,
}

impl<K: RecordKind> Clone for Record<K> {
    fn clone(&self) -> Self {
        Record {
            id: self.id.clone(),
            revision: self.revision.clone(),
            attributes: self.attributes.clone(),
            normalized: self.normalized.clone(),
            state: self.state,
            dirty: self.dirty,
            read_only: self.read_only,
            _kind: PhantomData,
        }
    }
}

impl<K: RecordKind> fmt::Debug for Record<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("kind", &K::DATABASE)
            .field("id", &self.id)
            .field("state", &self.state)
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl<K: RecordKind> Record<K> {
    /// Fresh record in `New` state. Populate it with [`Record::setup`].
    pub fn new(id: impl Into<String>) -> Self {
        Record {
            id: id.into(),
            revision: None,
            attributes: Doc::new(),
            normalized: DashMap::new(),
            state: Lifecycle::New,
            dirty: false,
            read_only: false,
            _kind: PhantomData,
        }
    }

    /// Fresh record populated from `initial` in one step
    pub fn create_new(id: impl Into<String>, initial: Doc) -> Result<Self> {
        let mut record = Self::new(id);
        record.setup(initial)?;
        Ok(record)
    }

    fn hydrate(id: String, mut attributes: Doc, revision: Revision) -> Self {
        attributes.insert("id".to_string(), Value::String(id.clone()));
        Record {
            id,
            revision: Some(revision),
            attributes,
            normalized: DashMap::new(),
            state: Lifecycle::Ready,
            dirty: false,
            read_only: false,
            _kind: PhantomData,
        }
    }

    /// Built-in record with a fixed payload and no storage counterpart.
    /// Every mutation entry point fails with `ReadOnly`.
    pub(crate) fn builtin(id: &str, attributes: Doc) -> Self {
        let mut record = Self::hydrate(id.to_string(), attributes, Revision::new(""));
        record.revision = None;
        record.read_only = true;
        record
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn revision(&self) -> Option<&Revision> {
        self.revision.as_ref()
    }

    pub fn state(&self) -> Lifecycle {
        self.state
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Raw attribute map as last written (normalized on write, not on read)
    pub fn attributes(&self) -> &Doc {
        &self.attributes
    }

    /// Canonical resource path, the `link-self` target
    pub fn url(&self) -> String {
        format!("/seed/{}/{}", K::DATABASE, self.id)
    }

    /// Normalized value for `key`. `id` is returned directly; everything
    /// else is normalized lazily and cached, so repeated reads of an
    /// unchanged key cost one map lookup.
    pub fn get(&self, key: &str) -> Result<Value> {
        if key == "id" {
            return Ok(Value::String(self.id.clone()));
        }
        if let Some(cached) = self.normalized.get(key) {
            return Ok(cached.clone());
        }
        let raw = self.attributes.get(key).cloned().unwrap_or(Value::Null);
        let value = K::normalize(key, raw, false)?;
        self.normalized.insert(key.to_string(), value.clone());
        Ok(value)
    }

    fn ensure_mutable(&self, op: &str) -> Result<()> {
        if self.read_only {
            return Err(GranaryError::ReadOnly(format!(
                "cannot {op} read-only {} {}",
                K::DATABASE,
                self.id
            )));
        }
        if self.state == Lifecycle::Destroyed {
            return Err(GranaryError::InvalidState(format!(
                "cannot {op} destroyed {} {}",
                K::DATABASE,
                self.id
            )));
        }
        Ok(())
    }

    /// Set `key` to the normalized form of `value` and mark the record
    /// dirty. Assigning `id` only moves the in-memory identifier; the
    /// persisted copy is re-synced at commit time.
    pub fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.ensure_mutable("set")?;
        if key == "id" {
            self.id = match value {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(GranaryError::Validation(format!(
                        "id must be a string, got {other}"
                    )))
                }
            };
            return Ok(());
        }
        let value = K::normalize(key, value, true)?;
        self.attributes.insert(key.to_string(), value.clone());
        self.normalized.insert(key.to_string(), value);
        self.dirty = true;
        Ok(())
    }

    /// Bulk [`Record::set`], skipping `id`
    pub fn modify(&mut self, attrs: Doc) -> Result<()> {
        for (key, value) in attrs {
            if key == "id" {
                continue;
            }
            self.set(&key, value)?;
        }
        Ok(())
    }

    /// Seed a `New` record with `initial` plus any required keys the input
    /// omitted, so every record of a kind always has its required keys
    /// present (null until normalized on read).
    pub fn setup(&mut self, initial: Doc) -> Result<()> {
        self.ensure_mutable("setup")?;
        if self.state != Lifecycle::New {
            return Err(GranaryError::InvalidState(format!(
                "setup is only valid for new records, {} {} is {}",
                K::DATABASE,
                self.id,
                self.state
            )));
        }
        for (key, value) in initial {
            self.attributes.insert(key, value);
        }
        for key in K::REQUIRED_KEYS {
            if !self.attributes.contains_key(*key) {
                self.attributes.insert((*key).to_string(), Value::Null);
            }
        }
        self.sync_id_attribute();
        self.normalized.clear();
        self.dirty = true;
        Ok(())
    }

    fn sync_id_attribute(&mut self) {
        self.attributes
            .insert("id".to_string(), Value::String(self.id.clone()));
    }

    /// Commit pending changes: `create` for `New` records, `update` for
    /// `Ready` ones. Returns whether a storage write happened.
    pub async fn commit(&mut self, store: &Store) -> Result<bool> {
        self.ensure_mutable("commit")?;
        match self.state {
            Lifecycle::New => self.create(store).await,
            Lifecycle::Ready => self.update(store).await,
            state => Err(GranaryError::InvalidState(format!(
                "cannot commit {} {} in state {}",
                K::DATABASE,
                self.id,
                state
            ))),
        }
    }

    /// First commit of a `New` record
    pub async fn create(&mut self, store: &Store) -> Result<bool> {
        self.ensure_mutable("create")?;
        if self.state != Lifecycle::New {
            return Err(GranaryError::InvalidState(format!(
                "cannot create {} {} in state {}",
                K::DATABASE,
                self.id,
                self.state
            )));
        }
        K::will_create(self, store).await?;
        self.sync_id_attribute();

        let db = store.database(K::DATABASE);
        let (assigned, revision) = db.insert(&self.id, &self.attributes).await?;
        if assigned != self.id {
            self.id = assigned;
            self.sync_id_attribute();
        }
        self.revision = Some(revision);
        self.state = Lifecycle::Ready;
        self.dirty = false;
        debug!(kind = K::DATABASE, id = %self.id, "Created record");

        K::did_create(self, store).await?;
        Ok(true)
    }

    /// Re-commit a `Ready` record. A clean record skips the storage round
    /// trip. On a revision conflict the in-memory record is left exactly as
    /// it was (still `Ready`, still dirty) so the caller may refresh and
    /// retry.
    pub async fn update(&mut self, store: &Store) -> Result<bool> {
        self.ensure_mutable("update")?;
        if self.state != Lifecycle::Ready {
            return Err(GranaryError::InvalidState(format!(
                "cannot update {} {} in state {}",
                K::DATABASE,
                self.id,
                self.state
            )));
        }
        if !self.dirty {
            return Ok(false);
        }
        K::will_update(self, store).await?;
        self.sync_id_attribute();

        let revision = self.revision.clone().ok_or_else(|| {
            GranaryError::InvalidState(format!(
                "{} {} has no revision to update against",
                K::DATABASE,
                self.id
            ))
        })?;
        let db = store.database(K::DATABASE);
        let revision = db.save(&self.id, &revision, &self.attributes).await?;
        self.revision = Some(revision);
        self.dirty = false;
        debug!(kind = K::DATABASE, id = %self.id, "Updated record");

        K::did_update(self, store).await?;
        Ok(true)
    }

    /// Remove the record from storage. Idempotent: destroying an already
    /// destroyed record, or discarding a `New` one, reports no effect
    /// (`Ok(false)`) without touching storage.
    pub async fn destroy(&mut self, store: &Store) -> Result<bool> {
        if self.read_only {
            return Err(GranaryError::ReadOnly(format!(
                "cannot destroy read-only {} {}",
                K::DATABASE,
                self.id
            )));
        }
        match self.state {
            Lifecycle::Destroyed => Ok(false),
            Lifecycle::New => {
                self.attributes.clear();
                self.normalized.clear();
                self.dirty = false;
                self.state = Lifecycle::Destroyed;
                Ok(false)
            }
            Lifecycle::Ready => {
                let revision = self.revision.clone().ok_or_else(|| {
                    GranaryError::InvalidState(format!(
                        "{} {} has no revision to destroy against",
                        K::DATABASE,
                        self.id
                    ))
                })?;
                let db = store.database(K::DATABASE);
                db.remove(&self.id, &revision).await?;
                self.attributes.clear();
                self.normalized.clear();
                self.dirty = false;
                self.state = Lifecycle::Destroyed;
                debug!(kind = K::DATABASE, id = %self.id, "Destroyed record");
                Ok(true)
            }
            Lifecycle::Committing => Err(GranaryError::InvalidState(format!(
                "cannot destroy {} {} mid-commit",
                K::DATABASE,
                self.id
            ))),
        }
    }

    /// Re-hydrate attributes and revision from storage, dropping local
    /// changes and the normalization cache.
    pub async fn refresh(&mut self, store: &Store) -> Result<()> {
        if self.read_only {
            // fixed in-memory payload, nothing to re-read
            return Ok(());
        }
        let db = store.database(K::DATABASE);
        let (attributes, revision) = db.get(&self.id).await?;
        self.attributes = attributes;
        self.sync_id_attribute();
        self.normalized.clear();
        self.revision = Some(revision);
        self.dirty = false;
        self.state = Lifecycle::Ready;
        Ok(())
    }

    /// Hydrate the record stored at `id`. `NotFound` when no document
    /// exists there.
    pub async fn find(store: &Store, id: &str) -> Result<Self> {
        let db = store.database(K::DATABASE);
        let (attributes, revision) = db.get(id).await?;
        Ok(Self::hydrate(id.to_string(), attributes, revision))
    }

    /// Every record of this kind, hydrated `Ready`
    pub async fn find_all(store: &Store) -> Result<Vec<Self>> {
        let db = store.database(K::DATABASE);
        Ok(db
            .all()
            .await?
            .into_iter()
            .map(|(id, attributes, revision)| Self::hydrate(id, attributes, revision))
            .collect())
    }

    /// Filtered, normalized view of the record for list responses
    pub async fn index_json(&self, acting: &User, store: &Store) -> Result<Value> {
        K::project(self, acting, store).await
    }

    /// Detail view. Same shape as the index view for every built-in kind.
    pub async fn show_json(&self, acting: &User, store: &Store) -> Result<Value> {
        self.index_json(acting, store).await
    }

    /// Default projection: every attribute normalized, plus `link-self`
    pub fn base_json(&self) -> Result<Value> {
        let mut out = Map::new();
        out.insert("id".to_string(), Value::String(self.id.clone()));
        for key in self.attributes.keys() {
            if key == "id" {
                continue;
            }
            out.insert(key.clone(), self.get(key)?);
        }
        out.insert("link-self".to_string(), Value::String(self.url()));
        Ok(Value::Object(out))
    }
}

/// JavaScript-style falsiness, which the normalization defaults follow
pub(crate) fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
