//! Credential resolution
//!
//! Maps a request's query credentials to exactly one acting [`User`].
//! Auth failures never propagate: a bad password, an unknown token, or a
//! storage hiccup all degrade to the anonymous identity, so downstream
//! handling always has a user to evaluate predicates against.

use serde::Deserialize;
use tracing::debug;

use crate::auth::password::digest;
use crate::record::{Token, User};
use crate::store::Store;
use crate::types::Result;

/// Credentials extracted from a request's query parameters
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Credentials {
    pub username: Option<String>,
    pub password: Option<String>,
    /// Precomputed password digest; preferred over `password` when both
    /// are present
    pub digest: Option<String>,
    /// Bearer token id
    pub token: Option<String>,
}

impl Credentials {
    /// Parse from a raw query string. Unknown parameters are ignored and a
    /// malformed query yields empty credentials (anonymous).
    pub fn from_query(query: &str) -> Credentials {
        serde_urlencoded::from_str(query).unwrap_or_default()
    }

    fn supplied_digest(&self) -> Option<String> {
        self.digest
            .clone()
            .or_else(|| self.password.as_deref().map(digest))
    }
}

/// Resolve `creds` to an acting user. Precedence: username/password, then
/// bearer token, then anonymous. Never fails.
pub async fn resolve(store: &Store, creds: &Credentials) -> User {
    match try_resolve(store, creds).await {
        Ok(Some(user)) => user,
        Ok(None) => User::anonymous(),
        Err(e) => {
            debug!(error = %e, "Credential lookup failed, resolving to anonymous");
            User::anonymous()
        }
    }
}

async fn try_resolve(store: &Store, creds: &Credentials) -> Result<Option<User>> {
    // username/password auth
    if let Some(username) = &creds.username {
        let user = User::lookup(store, username).await?;
        let stored = user.get("password")?;
        let supplied = creds.supplied_digest();
        return Ok(match (stored.as_str(), supplied.as_deref()) {
            (Some(stored), Some(supplied)) if stored == supplied => Some(user),
            _ => None,
        });
    }

    // token auth (the preferred mode)
    if let Some(token_id) = &creds.token {
        let token_id = token_id.to_lowercase();
        debug!(token = %token_id, "Resolving bearer token");
        let token = Token::find(store, &token_id).await?;
        return Ok(Some(token.user(store).await?));
    }

    // no credentials at all
    Ok(None)
}
