//! In-memory storage backend
//!
//! Backs unit tests and dev mode. Revisions are strings of a per-namespace
//! counter, so every successful write observably advances the revision.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{Database, Doc, Revision};
use crate::types::{GranaryError, Result};

pub struct MemoryBackend {
    databases: DashMap<String, Arc<MemoryDatabase>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            databases: DashMap::new(),
        }
    }

    pub fn database(&self, name: &str) -> Arc<dyn Database> {
        self.databases
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryDatabase::default()))
            .clone()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct Stored {
    doc: Doc,
    rev: u64,
}

#[derive(Default)]
pub struct MemoryDatabase {
    docs: DashMap<String, Stored>,
    counter: AtomicU64,
}

impl MemoryDatabase {
    fn next_rev(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }
}

fn revision(rev: u64) -> Revision {
    Revision::new(rev.to_string())
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn get(&self, id: &str) -> Result<(Doc, Revision)> {
        match self.docs.get(id) {
            Some(stored) => Ok((stored.doc.clone(), revision(stored.rev))),
            None => Err(GranaryError::NotFound(format!("no document at {id}"))),
        }
    }

    async fn insert(&self, id: &str, doc: &Doc) -> Result<(String, Revision)> {
        match self.docs.entry(id.to_string()) {
            Entry::Occupied(_) => Err(GranaryError::Conflict(format!(
                "document {id} already exists"
            ))),
            Entry::Vacant(entry) => {
                let rev = self.next_rev();
                entry.insert(Stored {
                    doc: doc.clone(),
                    rev,
                });
                Ok((id.to_string(), revision(rev)))
            }
        }
    }

    async fn save(&self, id: &str, rev: &Revision, doc: &Doc) -> Result<Revision> {
        match self.docs.get_mut(id) {
            Some(mut stored) => {
                if revision(stored.rev) != *rev {
                    return Err(GranaryError::Conflict(format!(
                        "stale revision {rev} for document {id}"
                    )));
                }
                let next = self.next_rev();
                stored.doc = doc.clone();
                stored.rev = next;
                Ok(revision(next))
            }
            None => Err(GranaryError::NotFound(format!("no document at {id}"))),
        }
    }

    async fn remove(&self, id: &str, rev: &Revision) -> Result<()> {
        match self.docs.entry(id.to_string()) {
            Entry::Occupied(entry) => {
                if revision(entry.get().rev) != *rev {
                    return Err(GranaryError::Conflict(format!(
                        "stale revision {rev} for document {id}"
                    )));
                }
                entry.remove();
                Ok(())
            }
            Entry::Vacant(_) => Err(GranaryError::NotFound(format!("no document at {id}"))),
        }
    }

    async fn all(&self) -> Result<Vec<(String, Doc, Revision)>> {
        let mut rows: Vec<(String, Doc, Revision)> = self
            .docs
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().doc.clone(),
                    revision(entry.value().rev),
                )
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: serde_json::Value) -> Doc {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let db = MemoryDatabase::default();
        let body = doc(json!({ "name": "bob" }));
        let (id, rev) = db.insert("bob", &body).await.unwrap();
        assert_eq!(id, "bob");

        let (fetched, fetched_rev) = db.get("bob").await.unwrap();
        assert_eq!(fetched, body);
        assert_eq!(fetched_rev, rev);
    }

    #[tokio::test]
    async fn test_insert_conflict_on_existing_id() {
        let db = MemoryDatabase::default();
        let body = doc(json!({}));
        db.insert("bob", &body).await.unwrap();
        let err = db.insert("bob", &body).await.unwrap_err();
        assert!(matches!(err, GranaryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_save_advances_revision() {
        let db = MemoryDatabase::default();
        let (_, rev1) = db.insert("bob", &doc(json!({ "n": 1 }))).await.unwrap();
        let rev2 = db.save("bob", &rev1, &doc(json!({ "n": 2 }))).await.unwrap();
        assert_ne!(rev1, rev2);

        let (body, _) = db.get("bob").await.unwrap();
        assert_eq!(body, doc(json!({ "n": 2 })));
    }

    #[tokio::test]
    async fn test_save_with_stale_revision_conflicts() {
        let db = MemoryDatabase::default();
        let (_, rev1) = db.insert("bob", &doc(json!({ "n": 1 }))).await.unwrap();
        db.save("bob", &rev1, &doc(json!({ "n": 2 }))).await.unwrap();

        // second writer still holds rev1
        let err = db.save("bob", &rev1, &doc(json!({ "n": 3 }))).await.unwrap_err();
        assert!(matches!(err, GranaryError::Conflict(_)));

        let (body, _) = db.get("bob").await.unwrap();
        assert_eq!(body, doc(json!({ "n": 2 })));
    }

    #[tokio::test]
    async fn test_remove_checks_revision() {
        let db = MemoryDatabase::default();
        let (_, rev1) = db.insert("bob", &doc(json!({}))).await.unwrap();
        let rev2 = db.save("bob", &rev1, &doc(json!({}))).await.unwrap();

        let err = db.remove("bob", &rev1).await.unwrap_err();
        assert!(matches!(err, GranaryError::Conflict(_)));

        db.remove("bob", &rev2).await.unwrap();
        assert!(db.get("bob").await.is_err());
    }

    #[tokio::test]
    async fn test_all_is_ordered_by_id() {
        let db = MemoryDatabase::default();
        db.insert("charlie", &doc(json!({}))).await.unwrap();
        db.insert("alice", &doc(json!({}))).await.unwrap();
        db.insert("bob", &doc(json!({}))).await.unwrap();

        let rows = db.all().await.unwrap();
        let ids: Vec<&str> = rows.iter().map(|(id, _, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["alice", "bob", "charlie"]);
    }
}
