//! Error taxonomy shared across the crate
//!
//! Record Core and Storage Port errors propagate unchanged to the caller.
//! The one deliberate exception is the credential resolver, which converts
//! every lookup failure into the anonymous identity instead of erroring.

use thiserror::Error;

/// Errors surfaced by the record core and its storage backends
#[derive(Error, Debug)]
pub enum GranaryError {
    /// No document exists for the requested id
    #[error("not found: {0}")]
    NotFound(String),

    /// Revision mismatch on write/delete, or insert over an existing id
    #[error("conflict: {0}")]
    Conflict(String),

    /// Operation is illegal for the record's current lifecycle state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Normalization rejected a value
    #[error("validation failed: {0}")]
    Validation(String),

    /// Mutation attempted on a read-only record (the anonymous identity)
    #[error("read-only: {0}")]
    ReadOnly(String),

    /// An authorization predicate said no; raised by the calling layer
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Uncategorized storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem backend I/O failure
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Document (de)serialization failure
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GranaryError>;

impl GranaryError {
    /// HTTP status the embedding route layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            GranaryError::NotFound(_) => 404,
            GranaryError::Conflict(_) => 409,
            GranaryError::Validation(_) => 400,
            GranaryError::ReadOnly(_) | GranaryError::Forbidden(_) => 403,
            GranaryError::InvalidState(_)
            | GranaryError::Storage(_)
            | GranaryError::Io(_)
            | GranaryError::Json(_) => 500,
        }
    }

    /// True for the lookup-miss case, which the resolver treats as benign
    pub fn is_not_found(&self) -> bool {
        matches!(self, GranaryError::NotFound(_))
    }
}
