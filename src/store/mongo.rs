//! MongoDB storage backend
//!
//! Documents are stored as `{ _id, _rev, doc }` and every write is a
//! compare-and-set against the `_rev` field, so conflict detection happens
//! server-side. The revision handed out is the `_rev` string.

use async_trait::async_trait;
use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::{Client, Collection};
use std::sync::Arc;
use tracing::info;

use super::{Database, Doc, Revision};
use crate::types::{GranaryError, Result};

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoBackend {
    client: Client,
    db_name: String,
}

impl MongoBackend {
    /// Connect and verify the server answers a ping
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        // serverSelectionTimeoutMS avoids hanging on an unreachable server
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| GranaryError::Storage(format!("Failed to connect to MongoDB: {e}")))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GranaryError::Storage(format!("MongoDB ping failed: {e}")))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    pub fn database(&self, name: &str) -> Arc<dyn Database> {
        Arc::new(MongoDatabase {
            coll: self
                .client
                .database(&self.db_name)
                .collection::<Document>(name),
        })
    }
}

pub struct MongoDatabase {
    coll: Collection<Document>,
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(*e.kind, ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == 11000)
}

fn to_stored(id: &str, rev: &str, doc: &Doc) -> Result<Document> {
    let body = bson::to_document(doc)
        .map_err(|e| GranaryError::Storage(format!("Document encode failed: {e}")))?;
    Ok(doc! { "_id": id, "_rev": rev, "doc": body })
}

fn from_stored(stored: &Document) -> Result<(String, Doc, Revision)> {
    let id = stored
        .get_str("_id")
        .map_err(|e| GranaryError::Storage(format!("Stored document has no _id: {e}")))?;
    let rev = stored
        .get_str("_rev")
        .map_err(|e| GranaryError::Storage(format!("Stored document has no _rev: {e}")))?;
    let body = stored
        .get_document("doc")
        .map_err(|e| GranaryError::Storage(format!("Stored document has no body: {e}")))?;
    let doc: Doc = bson::from_document(body.clone())
        .map_err(|e| GranaryError::Storage(format!("Document decode failed: {e}")))?;
    Ok((id.to_string(), doc, Revision::new(rev)))
}

fn bump(rev: &Revision) -> String {
    let n = rev.as_str().parse::<u64>().unwrap_or(0);
    (n + 1).to_string()
}

#[async_trait]
impl Database for MongoDatabase {
    async fn get(&self, id: &str) -> Result<(Doc, Revision)> {
        let stored = self
            .coll
            .find_one(doc! { "_id": id })
            .await
            .map_err(|e| GranaryError::Storage(format!("Find failed: {e}")))?
            .ok_or_else(|| GranaryError::NotFound(format!("no document at {id}")))?;
        let (_, doc, rev) = from_stored(&stored)?;
        Ok((doc, rev))
    }

    async fn insert(&self, id: &str, doc: &Doc) -> Result<(String, Revision)> {
        let stored = to_stored(id, "1", doc)?;
        match self.coll.insert_one(stored).await {
            Ok(_) => Ok((id.to_string(), Revision::new("1"))),
            Err(e) if is_duplicate_key(&e) => Err(GranaryError::Conflict(format!(
                "document {id} already exists"
            ))),
            Err(e) => Err(GranaryError::Storage(format!("Insert failed: {e}"))),
        }
    }

    async fn save(&self, id: &str, rev: &Revision, doc: &Doc) -> Result<Revision> {
        let next = bump(rev);
        let replacement = to_stored(id, &next, doc)?;
        let result = self
            .coll
            .replace_one(doc! { "_id": id, "_rev": rev.as_str() }, replacement)
            .await
            .map_err(|e| GranaryError::Storage(format!("Save failed: {e}")))?;

        if result.matched_count == 0 {
            // revision filter missed; figure out whether the doc is gone
            let exists = self
                .coll
                .find_one(doc! { "_id": id })
                .await
                .map_err(|e| GranaryError::Storage(format!("Find failed: {e}")))?
                .is_some();
            return Err(if exists {
                GranaryError::Conflict(format!("stale revision {rev} for document {id}"))
            } else {
                GranaryError::NotFound(format!("no document at {id}"))
            });
        }
        Ok(Revision::new(next))
    }

    async fn remove(&self, id: &str, rev: &Revision) -> Result<()> {
        let result = self
            .coll
            .delete_one(doc! { "_id": id, "_rev": rev.as_str() })
            .await
            .map_err(|e| GranaryError::Storage(format!("Delete failed: {e}")))?;

        if result.deleted_count == 0 {
            let exists = self
                .coll
                .find_one(doc! { "_id": id })
                .await
                .map_err(|e| GranaryError::Storage(format!("Find failed: {e}")))?
                .is_some();
            return Err(if exists {
                GranaryError::Conflict(format!("stale revision {rev} for document {id}"))
            } else {
                GranaryError::NotFound(format!("no document at {id}"))
            });
        }
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(String, Doc, Revision)>> {
        let cursor = self
            .coll
            .find(doc! {})
            .await
            .map_err(|e| GranaryError::Storage(format!("Find failed: {e}")))?;
        let stored: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| GranaryError::Storage(format!("Cursor failed: {e}")))?;

        let mut rows = stored
            .iter()
            .map(from_stored)
            .collect::<Result<Vec<_>>>()?;
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}
