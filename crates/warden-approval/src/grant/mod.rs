//! Grants: remembered approvals keyed by `(agent, action, resource)`.
//!
//! A [`Grant`] is created when a human approves a request with a cached
//! scope, or seeded directly. The [`GrantStore`] holds at most one grant per
//! key and checks expiry lazily on lookup. Persistent grants are mirrored to
//! a [`GrantPersistence`] backend.

mod persist;
mod store;

pub use persist::{GrantPersistence, JsonGrantFile, NoPersistence};
pub use store::GrantStore;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::{AgentId, GrantId, GrantScope, Timestamp};

/// Lookup key for a grant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GrantKey {
    /// Agent the grant belongs to.
    pub agent_id: AgentId,
    /// Canonical action string.
    pub action: String,
    /// Normalized resource.
    pub resource: String,
}

impl GrantKey {
    /// Build a key.
    #[must_use]
    pub fn new(agent_id: &AgentId, action: &str, resource: &str) -> Self {
        Self {
            agent_id: agent_id.clone(),
            action: action.to_owned(),
            resource: resource.to_owned(),
        }
    }
}

/// A remembered approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    /// Unique grant identifier.
    pub id: GrantId,
    /// Agent the grant belongs to.
    pub agent_id: AgentId,
    /// Canonical action string.
    pub action: String,
    /// Normalized resource.
    pub resource: String,
    /// Lifetime of the grant.
    pub scope: GrantScope,
    /// When the grant was created.
    pub created_at: Timestamp,
    /// When the grant stops applying (None = never within its scope).
    pub expires_at: Option<Timestamp>,
}

impl Grant {
    /// Create a grant without expiry.
    #[must_use]
    pub fn new(
        agent_id: AgentId,
        action: impl Into<String>,
        resource: impl Into<String>,
        scope: GrantScope,
    ) -> Self {
        Self {
            id: GrantId::new(),
            agent_id,
            action: action.into(),
            resource: resource.into(),
            scope,
            created_at: Timestamp::now(),
            expires_at: None,
        }
    }

    /// Set an absolute expiry.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Expire `ttl` from now. A TTL too large to represent means no expiry.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = Timestamp::after(ttl);
        self
    }

    /// Check if the grant has expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.as_ref().is_some_and(Timestamp::is_past)
    }

    /// The store key for this grant.
    #[must_use]
    pub fn key(&self) -> GrantKey {
        GrantKey::new(&self.agent_id, &self.action, &self.resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_grant_without_expiry_never_expires() {
        let g = Grant::new(AgentId::from("a"), "file.read", "x", GrantScope::Session);
        assert!(!g.is_expired());
        assert_eq!(g.key(), GrantKey::new(&AgentId::from("a"), "file.read", "x"));
    }

    #[test]
    fn test_grant_expiry() {
        let past = Timestamp::from_datetime(Utc::now() - chrono::Duration::seconds(5));
        let g = Grant::new(AgentId::from("a"), "file.read", "x", GrantScope::Session)
            .with_expiry(past);
        assert!(g.is_expired());

        let g = Grant::new(AgentId::from("a"), "file.read", "x", GrantScope::Session)
            .with_ttl(Duration::from_secs(3600));
        assert!(!g.is_expired());
    }

    #[test]
    fn test_grant_serde() {
        let g = Grant::new(AgentId::from("coder"), "exec", "ls", GrantScope::Persistent);
        let json = serde_json::to_value(&g).unwrap();
        assert_eq!(json["agent_id"], "coder");
        assert_eq!(json["scope"], "persistent");
        let back: Grant = serde_json::from_value(json).unwrap();
        assert_eq!(back, g);
    }
}
