//! User records
//!
//! A user owns zero or more tokens (matched by username) and carries the
//! group list every authorization predicate is derived from. The anonymous
//! identity is a fixed, read-only, in-memory user with no storage
//! counterpart.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;
use tracing::debug;
use uuid::Uuid;

use super::token::Token;
use super::{is_falsy, Record, RecordKind};
use crate::auth::password::digest;
use crate::store::{Doc, Store};
use crate::types::Result;

pub struct UserKind;

pub type User = Record<UserKind>;

#[async_trait]
impl RecordKind for UserKind {
    const DATABASE: &'static str = "users";
    const REQUIRED_KEYS: &'static [&'static str] = &["name", "email", "password", "groups"];

    fn normalize(key: &str, value: Value, _writing: bool) -> Result<Value> {
        match key {
            "groups" => Ok(normalize_groups(value)),
            _ => Ok(value),
        }
    }

    /// Mint a companion token so a fresh signup can authenticate
    /// immediately. The signup route reads it back via `tokens()`.
    async fn did_create(record: &mut Record<Self>, store: &Store) -> Result<()> {
        let token_id = Uuid::new_v4().to_string();
        let mut token = Token::create_new(
            token_id,
            Doc::from_iter([
                ("username".to_string(), json!(record.id())),
                ("expiration".to_string(), json!(0)),
            ]),
        )?;
        token.commit(store).await?;
        debug!(user = %record.id(), token = %token.id(), "Minted companion token");
        Ok(())
    }

    async fn project(record: &Record<Self>, acting: &User, store: &Store) -> Result<Value> {
        let mut out = Map::new();
        for key in ["id", "name", "email", "groups"] {
            out.insert(key.to_string(), record.get(key)?);
        }
        out.insert("link-self".to_string(), Value::String(record.url()));

        if acting.can_see_tokens_for_user(record) {
            let tokens = record.tokens(store).await?;
            if !tokens.is_empty() {
                let ids: Vec<Value> = tokens.iter().map(|t| json!(t.id())).collect();
                out.insert("tokens".to_string(), Value::Array(ids));
            }
        }
        Ok(Value::Object(out))
    }
}

fn normalize_groups(value: Value) -> Value {
    if is_falsy(&value) {
        return json!(["guest"]);
    }
    match value {
        Value::Array(_) => value,
        Value::String(s) => json!([s]),
        _ => json!([]),
    }
}

static ANONYMOUS: OnceLock<User> = OnceLock::new();

impl Record<UserKind> {
    /// The fixed identity unauthenticated callers act as. Read-only, group
    /// `guest`, no backing document.
    pub fn anonymous() -> User {
        ANONYMOUS
            .get_or_init(|| {
                let attrs = Doc::from_iter([
                    ("id".to_string(), json!("anonymous")),
                    ("name".to_string(), json!("anonymous")),
                    ("groups".to_string(), json!(["guest"])),
                ]);
                User::builtin("anonymous", attrs)
            })
            .clone()
    }

    /// Finder that resolves the anonymous id to the in-memory singleton
    /// before consulting storage.
    pub async fn lookup(store: &Store, id: &str) -> Result<User> {
        if id == "anonymous" {
            return Ok(User::anonymous());
        }
        User::find(store, id).await
    }

    /// Normalized group list
    pub fn groups(&self) -> Vec<String> {
        match self.get("groups") {
            Ok(Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Store the digest of `plaintext` as the password attribute. The
    /// plaintext itself never reaches the attribute map.
    pub fn set_password(&mut self, plaintext: &str) -> Result<()> {
        self.set("password", Value::String(digest(plaintext)))
    }

    /// Every token owned by this user (matched by username)
    pub async fn tokens(&self, store: &Store) -> Result<Vec<Token>> {
        let username = self.id().to_string();
        let tokens = Token::find_all(store).await?;
        Ok(tokens
            .into_iter()
            .filter(|t| {
                t.get("username")
                    .map(|v| v.as_str() == Some(username.as_str()))
                    .unwrap_or(false)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GranaryError;
    use serde_json::json;

    fn doc(value: Value) -> Doc {
        value.as_object().unwrap().clone()
    }

    fn signup(id: &str) -> User {
        User::create_new(
            id,
            doc(json!({
                "name": id,
                "email": format!("{id}@example.com"),
                "password": digest("secret"),
            })),
        )
        .unwrap()
    }

    #[test]
    fn test_groups_normalization() {
        let user = User::create_new("bob", doc(json!({ "groups": "admin" }))).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!(["admin"]));

        let user = User::create_new("bob", doc(json!({ "groups": null }))).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!(["guest"]));

        let user = User::create_new("bob", doc(json!({}))).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!(["guest"]));

        let user = User::create_new("bob", doc(json!({ "groups": 42 }))).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!([]));

        // an explicitly empty list is respected, not defaulted
        let user = User::create_new("bob", doc(json!({ "groups": [] }))).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!([]));
    }

    #[test]
    fn test_setup_seeds_required_keys() {
        let user = User::create_new("bob", doc(json!({}))).unwrap();
        for &key in UserKind::REQUIRED_KEYS {
            assert!(user.attributes().contains_key(key), "missing {key}");
            user.get(key).unwrap();
        }
    }

    #[test]
    fn test_set_then_get_returns_normalized() {
        let mut user = User::create_new("bob", doc(json!({}))).unwrap();
        user.set("groups", json!("admin")).unwrap();
        assert_eq!(user.get("groups").unwrap(), json!(["admin"]));
        // normalization is idempotent: the stored raw value is already
        // normalized, so a second round trip changes nothing
        assert_eq!(user.attributes().get("groups"), Some(&json!(["admin"])));
        assert_eq!(user.get("groups").unwrap(), json!(["admin"]));
        assert!(user.is_dirty());
    }

    #[test]
    fn test_repeated_get_is_stable() {
        let user = User::create_new("bob", doc(json!({ "groups": "admin" }))).unwrap();
        let first = user.get("groups").unwrap();
        for _ in 0..3 {
            assert_eq!(user.get("groups").unwrap(), first);
        }
    }

    #[test]
    fn test_set_password_stores_digest() {
        let mut user = signup("bob");
        user.set_password("hunter2").unwrap();
        let stored = user.get("password").unwrap();
        assert_eq!(stored.as_str(), Some(digest("hunter2").as_str()));
        assert_ne!(stored.as_str(), Some("hunter2"));
    }

    #[test]
    fn test_anonymous_is_read_only() {
        let mut anon = User::anonymous();
        assert_eq!(anon.id(), "anonymous");
        assert_eq!(anon.groups(), vec!["guest".to_string()]);
        assert!(anon.is_read_only());

        let err = anon.set("name", json!("mallory")).unwrap_err();
        assert!(matches!(err, GranaryError::ReadOnly(_)));
    }

    #[tokio::test]
    async fn test_anonymous_rejects_commit_and_destroy() {
        let store = Store::memory();
        let mut anon = User::anonymous();
        assert!(matches!(
            anon.commit(&store).await.unwrap_err(),
            GranaryError::ReadOnly(_)
        ));
        assert!(matches!(
            anon.destroy(&store).await.unwrap_err(),
            GranaryError::ReadOnly(_)
        ));
    }

    #[tokio::test]
    async fn test_lookup_resolves_anonymous_without_storage() {
        let store = Store::memory();
        let anon = User::lookup(&store, "anonymous").await.unwrap();
        assert!(anon.is_read_only());

        let err = User::lookup(&store, "ghost").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_signup_mints_companion_token() {
        let store = Store::memory();
        let mut user = signup("bob");
        user.commit(&store).await.unwrap();

        let tokens = user.tokens(&store).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].get("username").unwrap(), json!("bob"));
        assert_eq!(tokens[0].get("expiration").unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_tokens_filters_by_username() {
        let store = Store::memory();
        let mut bob = signup("bob");
        bob.commit(&store).await.unwrap();
        let mut alice = signup("alice");
        alice.commit(&store).await.unwrap();

        let bobs = bob.tokens(&store).await.unwrap();
        assert_eq!(bobs.len(), 1);
        assert!(bobs
            .iter()
            .all(|t| t.get("username").unwrap() == json!("bob")));
    }

    #[tokio::test]
    async fn test_index_json_shows_tokens_to_self_only() {
        let store = Store::memory();
        let mut bob = signup("bob");
        bob.commit(&store).await.unwrap();
        let mut eve = signup("eve");
        eve.commit(&store).await.unwrap();

        let own_view = bob.index_json(&bob, &store).await.unwrap();
        assert_eq!(own_view["id"], json!("bob"));
        assert_eq!(own_view["link-self"], json!("/seed/users/bob"));
        assert!(own_view["tokens"].is_array());
        // the password digest never leaves the record
        assert!(own_view.get("password").is_none());

        let eves_view = bob.index_json(&eve, &store).await.unwrap();
        assert!(eves_view.get("tokens").is_none());

        let anon_view = bob.index_json(&User::anonymous(), &store).await.unwrap();
        assert!(anon_view.get("tokens").is_none());
    }

    #[tokio::test]
    async fn test_index_json_shows_tokens_to_admin() {
        let store = Store::memory();
        let mut bob = signup("bob");
        bob.commit(&store).await.unwrap();

        let admin = User::create_new("root", doc(json!({ "groups": ["admin"] }))).unwrap();
        let view = bob.index_json(&admin, &store).await.unwrap();
        assert!(view["tokens"].is_array());
    }
}
