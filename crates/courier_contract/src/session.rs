use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{SenderProfile, UserId};

/// Authenticated principal for one call, passed explicitly into the
/// orchestrator and query service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub user_id: UserId,
    pub email: String,
    pub name: Option<String>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn is_authenticated(&self) -> bool {
        !self.user_id.trim().is_empty()
    }

    pub fn profile(&self) -> SenderProfile {
        SenderProfile {
            id: self.user_id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Source of caller identity. Credentials are trusted as-is.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, bearer_token: &str) -> Option<Session>;

    /// Every principal this provider knows about, used to seed profiles.
    fn known_sessions(&self) -> Vec<Session> {
        Vec::new()
    }
}

/// Token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityProvider {
    tokens: HashMap<String, Session>,
}

impl StaticIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, token: impl Into<String>, session: Session) -> Self {
        self.tokens.insert(token.into(), session);
        self
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn resolve(&self, bearer_token: &str) -> Option<Session> {
        if bearer_token.is_empty() {
            return None;
        }
        self.tokens.get(bearer_token).cloned()
    }

    fn known_sessions(&self) -> Vec<Session> {
        let mut sessions: Vec<Session> = self.tokens.values().cloned().collect();
        sessions.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        sessions
    }
}
