//! Authentication and authorization
//!
//! Provides:
//! - Password digests compared for equality on the wire
//! - Credential resolution (token, username/password, anonymous fallback)
//! - ACLs mapping operations to user/group subjects
//! - Authorization predicates over a resolved user

pub mod acl;
pub mod password;
pub mod permissions;
pub mod resolver;

pub use acl::Acl;
pub use password::digest;
pub use resolver::{resolve, Credentials};
