//! Caller Identity
//!
//! Identity issuance lives outside this crate. The grading core only needs
//! to turn a presented bearer token into a [`Caller`], which is what the
//! [`IdentityProvider`] collaborator does.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::config::AuthConfig;

/// An authenticated caller
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Caller {
    /// Stable user id, used as the rate-limit key
    pub user_id: String,

    /// Holds the admin capability
    pub is_admin: bool,
}

impl Caller {
    /// A regular user
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: false,
        }
    }

    /// A user holding the admin capability
    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_admin: true,
        }
    }
}

/// Resolves bearer tokens to callers
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Look up the caller a token belongs to
    async fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Identity directory backed by a fixed token table
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    /// Token -> user id
    tokens: HashMap<String, String>,

    /// Users holding the admin capability
    admin_users: HashSet<String>,
}

impl StaticIdentityProvider {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[auth]` config section
    pub fn from_config(config: &AuthConfig) -> Self {
        Self {
            tokens: config.tokens.clone(),
            admin_users: config.admin_users.iter().cloned().collect(),
        }
    }

    /// Register a token for a user
    pub fn with_token(mut self, token: impl Into<String>, user_id: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), user_id.into());
        self
    }

    /// Grant the admin capability to a user
    pub fn with_admin(mut self, user_id: impl Into<String>) -> Self {
        self.admin_users.insert(user_id.into());
        self
    }

    /// Number of known tokens
    pub fn token_count(&self) -> usize {
        self.tokens.len()
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, token: &str) -> Option<Caller> {
        let user_id = self.tokens.get(token)?;
        Some(Caller {
            user_id: user_id.clone(),
            is_admin: self.admin_users.contains(user_id),
        })
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}
