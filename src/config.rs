//! Configuration for the record store
//!
//! CLI arguments and environment variable handling using clap. The embedding
//! server parses these and hands them to [`crate::store::Store::open`].

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::types::{GranaryError, Result};

/// Which storage backend holds the record documents
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// In-process map, nothing persisted. Tests and dev mode.
    Memory,
    /// One JSON file per record under the data directory
    Filesystem,
    /// Document database with server-side conflict detection
    Mongodb,
}

/// Record store configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "granary")]
#[command(about = "Record store and identity core for the Seed package registry")]
pub struct Args {
    /// Storage backend for record documents
    #[arg(long, env = "STORAGE_BACKEND", value_enum, default_value = "filesystem")]
    pub storage: StorageBackend,

    /// Root directory for the filesystem backend
    #[arg(long, env = "DATA_DIR", default_value = "./data")]
    pub data_dir: PathBuf,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "seed")]
    pub mongodb_db: String,

    /// Prefix for kind-scoped database names (e.g. "seed" yields "seed-users")
    #[arg(long, env = "DATABASE_PREFIX", default_value = "seed")]
    pub database_prefix: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    /// Validate the configuration before the store is opened
    pub fn validate(&self) -> Result<()> {
        if self.database_prefix.is_empty() {
            return Err(GranaryError::Validation(
                "database prefix must not be empty".into(),
            ));
        }
        if self.database_prefix.contains('/') {
            return Err(GranaryError::Validation(
                "database prefix must not contain path separators".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("granary").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&[]);
        assert_eq!(args.storage, StorageBackend::Filesystem);
        assert_eq!(args.database_prefix, "seed");
        assert_eq!(args.log_level, "info");
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_backend_selection() {
        let args = parse(&["--storage", "memory"]);
        assert_eq!(args.storage, StorageBackend::Memory);
        let args = parse(&["--storage", "mongodb", "--mongodb-db", "registry"]);
        assert_eq!(args.storage, StorageBackend::Mongodb);
        assert_eq!(args.mongodb_db, "registry");
    }

    #[test]
    fn test_rejects_bad_prefix() {
        let args = parse(&["--database-prefix", ""]);
        assert!(args.validate().is_err());
        let args = parse(&["--database-prefix", "a/b"]);
        assert!(args.validate().is_err());
    }
}
