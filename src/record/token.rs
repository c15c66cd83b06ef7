//! Token records
//!
//! A token is a bearer credential referencing its owner by username.
//! Expiration is a numeric epoch where 0 means never expires.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::user::User;
use super::{is_falsy, Record, RecordKind};
use crate::store::Store;
use crate::types::Result;

pub struct TokenKind;

pub type Token = Record<TokenKind>;

#[async_trait]
impl RecordKind for TokenKind {
    const DATABASE: &'static str = "tokens";
    const REQUIRED_KEYS: &'static [&'static str] = &["username", "expiration"];

    fn normalize(key: &str, value: Value, _writing: bool) -> Result<Value> {
        match key {
            "username" => Ok(if is_falsy(&value) {
                json!("anonymous")
            } else {
                value
            }),
            "expiration" => Ok(normalize_expiration(value)),
            _ => Ok(value),
        }
    }

    async fn project(record: &Record<Self>, _acting: &User, _store: &Store) -> Result<Value> {
        let mut out = Map::new();
        for key in ["id", "username", "expiration"] {
            out.insert(key.to_string(), record.get(key)?);
        }
        out.insert("link-self".to_string(), Value::String(record.url()));
        Ok(Value::Object(out))
    }
}

/// Coerce to a numeric epoch the way `Number(value)` would, with anything
/// non-numeric landing on 0 (never expires)
fn normalize_expiration(value: Value) -> Value {
    match value {
        Value::Number(_) => value,
        Value::String(s) => {
            let trimmed = s.trim();
            if let Ok(n) = trimmed.parse::<i64>() {
                json!(n)
            } else if let Some(n) = trimmed.parse::<f64>().ok().and_then(serde_json::Number::from_f64)
            {
                Value::Number(n)
            } else {
                json!(0)
            }
        }
        _ => json!(0),
    }
}

impl Record<TokenKind> {
    /// The user this token authenticates as
    pub async fn user(&self, store: &Store) -> Result<User> {
        let username = self.get("username")?;
        let username = username.as_str().unwrap_or("anonymous");
        User::lookup(store, username).await
    }
}
