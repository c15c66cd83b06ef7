//! Filesystem storage backend
//!
//! One `<database>/<id>.json` file per record. The revision token is a
//! bumped counter persisted in the file under a `_rev` key and stripped
//! before the document is handed back, so stale writers are detected the
//! same way as with the document database backend.

use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use async_trait::async_trait;

use super::{Database, Doc, Revision};
use crate::types::{GranaryError, Result};

const REV_KEY: &str = "_rev";

pub struct FsDatabase {
    dir: PathBuf,
}

impl FsDatabase {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FsDatabase { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if id.is_empty() || id.contains('/') || id.contains('\\') || id == "." || id == ".." {
            return Err(GranaryError::Validation(format!(
                "id {id:?} is not a valid document name"
            )));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    async fn read_stored(&self, path: &Path, id: &str) -> Result<(Doc, Revision)> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(GranaryError::NotFound(format!("no document at {id}")));
            }
            Err(e) => return Err(e.into()),
        };
        let value: Value = serde_json::from_slice(&bytes)?;
        let mut doc = match value {
            Value::Object(map) => map,
            _ => {
                return Err(GranaryError::Storage(format!(
                    "document {id} is not a JSON object"
                )))
            }
        };
        let rev = match doc.remove(REV_KEY) {
            Some(Value::String(rev)) => Revision::new(rev),
            _ => {
                return Err(GranaryError::Storage(format!(
                    "document {id} has no revision field"
                )))
            }
        };
        Ok((doc, rev))
    }

    async fn write_stored(&self, path: &Path, doc: &Doc, rev: &Revision) -> Result<()> {
        let mut stored = doc.clone();
        stored.insert(REV_KEY.to_string(), Value::String(rev.as_str().to_string()));
        let bytes = serde_json::to_vec_pretty(&Value::Object(stored))?;
        fs::write(path, bytes).await?;
        Ok(())
    }
}

fn bump(rev: &Revision) -> Revision {
    let n = rev.as_str().parse::<u64>().unwrap_or(0);
    Revision::new((n + 1).to_string())
}

#[async_trait]
impl Database for FsDatabase {
    async fn get(&self, id: &str) -> Result<(Doc, Revision)> {
        let path = self.path_for(id)?;
        self.read_stored(&path, id).await
    }

    async fn insert(&self, id: &str, doc: &Doc) -> Result<(String, Revision)> {
        let path = self.path_for(id)?;
        fs::create_dir_all(&self.dir).await?;
        if fs::metadata(&path).await.is_ok() {
            return Err(GranaryError::Conflict(format!(
                "document {id} already exists"
            )));
        }
        let rev = Revision::new("1");
        self.write_stored(&path, doc, &rev).await?;
        debug!(id = %id, path = %path.display(), "Inserted document");
        Ok((id.to_string(), rev))
    }

    async fn save(&self, id: &str, rev: &Revision, doc: &Doc) -> Result<Revision> {
        let path = self.path_for(id)?;
        let (_, stored_rev) = self.read_stored(&path, id).await?;
        if stored_rev != *rev {
            return Err(GranaryError::Conflict(format!(
                "stale revision {rev} for document {id}"
            )));
        }
        let next = bump(&stored_rev);
        self.write_stored(&path, doc, &next).await?;
        Ok(next)
    }

    async fn remove(&self, id: &str, rev: &Revision) -> Result<()> {
        let path = self.path_for(id)?;
        let (_, stored_rev) = self.read_stored(&path, id).await?;
        if stored_rev != *rev {
            return Err(GranaryError::Conflict(format!(
                "stale revision {rev} for document {id}"
            )));
        }
        fs::remove_file(&path).await?;
        debug!(id = %id, "Removed document");
        Ok(())
    }

    async fn all(&self) -> Result<Vec<(String, Doc, Revision)>> {
        let mut reader = match fs::read_dir(&self.dir).await {
            Ok(reader) => reader,
            // namespace that was never written to is just empty
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(String::from) else {
                continue;
            };
            let (doc, rev) = self.read_stored(&path, &id).await?;
            rows.push((id, doc, rev));
        }
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows)
    }
}
