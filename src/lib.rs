//! Granary - record store and identity core for the Seed package registry
//!
//! A granary is where seed is kept. This crate keeps the registry's
//! persisted JSON entities: users, auth tokens, and generic records, all
//! expressed as one [`record::Record`] abstraction with lifecycle states,
//! lazy attribute normalization, dirty tracking, and optimistic-concurrency
//! commits against a pluggable [`store::Database`] port.
//!
//! ## Components
//!
//! - **Store**: key-addressed document storage with revision tokens
//!   (memory, filesystem, and MongoDB backends)
//! - **Record**: generic entity with a commit protocol and per-kind
//!   normalization (`users`, `tokens`, generic `records`)
//! - **Resolver**: inbound credentials to an acting user, anonymous
//!   fallback, never errors
//! - **Permissions**: pure authorization predicates over a resolved user,
//!   group membership, and per-resource ACLs
//!
//! The HTTP route layer lives in the embedding server; it resolves
//! credentials, checks a predicate, then drives a record. The core never
//! re-checks authorization internally.

pub mod auth;
pub mod config;
pub mod logging;
pub mod record;
pub mod store;
pub mod types;

pub use auth::{resolve, Acl, Credentials};
pub use config::Args;
pub use record::{GenericRecord, Lifecycle, Record, RecordKind, Token, User};
pub use store::{Database, Doc, Revision, Store};
pub use types::{GranaryError, Result};
