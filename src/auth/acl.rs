//! Access-control lists
//!
//! An ACL maps an operation name (`readers`, `writers`, `owners`) to the
//! set of subjects permitted to perform it, where a subject is either a
//! username or a group name. ACLs are owned by the package layer; the
//! authorization predicates only ever ask which operations a user holds.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Operation name to subject set
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Acl {
    #[serde(flatten)]
    operations: BTreeMap<String, BTreeSet<String>>,
}

impl Acl {
    pub fn new() -> Self {
        Acl::default()
    }

    /// Add `subject` (a username or group name) to `operation`
    pub fn grant(&mut self, operation: &str, subject: &str) -> &mut Self {
        self.operations
            .entry(operation.to_string())
            .or_default()
            .insert(subject.to_string());
        self
    }

    /// The union of operation names granted to `user_id` directly or
    /// through any of `groups`. Sorted, so tests and projections are
    /// deterministic.
    pub fn operations_for_user(&self, user_id: &str, groups: &[String]) -> Vec<String> {
        self.operations
            .iter()
            .filter(|(_, subjects)| {
                subjects.contains(user_id) || groups.iter().any(|g| subjects.contains(g))
            })
            .map(|(operation, _)| operation.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_direct_grant() {
        let mut acl = Acl::new();
        acl.grant("owners", "bob").grant("readers", "alice");

        assert_eq!(acl.operations_for_user("bob", &[]), vec!["owners"]);
        assert_eq!(acl.operations_for_user("alice", &[]), vec!["readers"]);
        assert!(acl.operations_for_user("eve", &[]).is_empty());
    }

    #[test]
    fn test_group_grant_unions_with_direct() {
        let mut acl = Acl::new();
        acl.grant("readers", "staff")
            .grant("writers", "staff")
            .grant("owners", "bob");

        let ops = acl.operations_for_user("bob", &groups(&["staff"]));
        assert_eq!(ops, vec!["owners", "readers", "writers"]);
    }

    #[test]
    fn test_deserializes_from_document_shape() {
        let acl: Acl = serde_json::from_value(serde_json::json!({
            "readers": ["alice", "staff"],
            "owners": ["bob"],
        }))
        .unwrap();

        assert_eq!(acl.operations_for_user("alice", &[]), vec!["readers"]);
        assert_eq!(
            acl.operations_for_user("eve", &groups(&["staff"])),
            vec!["readers"]
        );
    }
}
