//! Concurrent grant store.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use warden_core::{AgentId, GrantScope, PermissionResult};

use super::{Grant, GrantKey, GrantPersistence, NoPersistence};

/// Store of active grants, one per `(agent, action, resource)`.
///
/// Backed by a sharded map: mutations of one key are exclusive, unrelated
/// keys proceed concurrently. Expired grants are dropped lazily when they
/// are looked up, or in bulk by [`cleanup_expired`](Self::cleanup_expired).
///
/// Changes to persistent grants save the snapshot on the calling thread.
/// With a file backend, async callers should run [`put`](Self::put),
/// [`revoke`](Self::revoke) and [`flush`](Self::flush) under
/// `tokio::task::spawn_blocking`.
///
/// # Example
///
/// ```
/// use warden_approval::{Grant, GrantStore};
/// use warden_core::{AgentId, GrantScope};
///
/// let store = GrantStore::new();
/// let agent = AgentId::from("coder");
/// store.put(Grant::new(agent.clone(), "file.write", "src/a.rs", GrantScope::Session)).unwrap();
/// assert!(store.lookup(&agent, "file.write", "src/a.rs").is_some());
/// assert!(store.lookup(&agent, "file.write", "src/b.rs").is_none());
/// ```
pub struct GrantStore {
    grants: DashMap<GrantKey, Grant>,
    persistence: Arc<dyn GrantPersistence>,
    /// Serializes snapshot-and-save so older snapshots never overwrite newer ones.
    flush_lock: Mutex<()>,
}

impl GrantStore {
    /// Create an in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grants: DashMap::new(),
            persistence: Arc::new(NoPersistence),
            flush_lock: Mutex::new(()),
        }
    }

    /// Create a store backed by `persistence`, loading its persistent grants.
    ///
    /// Expired and non-persistent entries in the backend are ignored.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if loading fails.
    pub fn with_persistence(persistence: Arc<dyn GrantPersistence>) -> PermissionResult<Self> {
        let grants = DashMap::new();
        let mut loaded = 0usize;
        for grant in persistence.load()? {
            if grant.scope == GrantScope::Persistent && !grant.is_expired() {
                grants.insert(grant.key(), grant);
                loaded = loaded.saturating_add(1);
            }
        }
        tracing::debug!(count = loaded, "loaded persistent grants");
        Ok(Self {
            grants,
            persistence,
            flush_lock: Mutex::new(()),
        })
    }

    /// Find the live grant for a key, dropping it if it has expired.
    #[must_use]
    pub fn lookup(&self, agent_id: &AgentId, action: &str, resource: &str) -> Option<Grant> {
        let key = GrantKey::new(agent_id, action, resource);
        match self.grants.get(&key) {
            None => return None,
            Some(grant) if !grant.is_expired() => return Some(grant.clone()),
            Some(_) => {},
        }
        self.purge_if_expired(&key);
        None
    }

    /// Insert a grant, replacing any grant with the same key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a persistent snapshot could not be saved.
    /// The in-memory store is updated regardless.
    pub fn put(&self, grant: Grant) -> PermissionResult<()> {
        let persistent = grant.scope == GrantScope::Persistent;
        let replaced = self.grants.insert(grant.key(), grant);
        let was_persistent = replaced.is_some_and(|g| g.scope == GrantScope::Persistent);
        if persistent || was_persistent {
            self.flush()?;
        }
        Ok(())
    }

    /// Record one use of `grant`.
    ///
    /// One-time grants are removed if the stored grant is still the same one.
    /// Returns `false` if a one-time grant had already been used or replaced.
    pub fn consume(&self, grant: &Grant) -> bool {
        if grant.scope != GrantScope::OneTime {
            return true;
        }
        self.grants
            .remove_if(&grant.key(), |_, stored| stored.id == grant.id)
            .is_some()
    }

    /// Atomically look up a grant and consume it if it is one-time.
    ///
    /// Two concurrent callers can never both obtain the same one-time grant.
    #[must_use]
    pub fn take(&self, agent_id: &AgentId, action: &str, resource: &str) -> Option<Grant> {
        let key = GrantKey::new(agent_id, action, resource);
        let (found, purged_persistent) = match self.grants.entry(key) {
            Entry::Vacant(_) => (None, false),
            Entry::Occupied(entry) => {
                if entry.get().is_expired() {
                    let expired = entry.remove();
                    (None, expired.scope == GrantScope::Persistent)
                } else if entry.get().scope == GrantScope::OneTime {
                    (Some(entry.remove()), false)
                } else {
                    (Some(entry.get().clone()), false)
                }
            },
        };
        if purged_persistent {
            self.flush_logged();
        }
        found
    }

    /// Remove the grant for a key.
    ///
    /// # Errors
    ///
    /// Returns a storage error if a persistent snapshot could not be saved.
    pub fn revoke(
        &self,
        agent_id: &AgentId,
        action: &str,
        resource: &str,
    ) -> PermissionResult<Option<Grant>> {
        let removed = self
            .grants
            .remove(&GrantKey::new(agent_id, action, resource))
            .map(|(_, g)| g);
        if removed
            .as_ref()
            .is_some_and(|g| g.scope == GrantScope::Persistent)
        {
            self.flush()?;
        }
        Ok(removed)
    }

    /// Drop all session and one-time grants. Returns how many were removed.
    pub fn clear_session(&self) -> usize {
        let before = self.grants.len();
        self.grants
            .retain(|_, g| g.scope == GrantScope::Persistent);
        before.saturating_sub(self.grants.len())
    }

    /// Drop all expired grants. Returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let mut removed = 0usize;
        let mut purged_persistent = false;
        self.grants.retain(|_, g| {
            if g.is_expired() {
                removed = removed.saturating_add(1);
                purged_persistent |= g.scope == GrantScope::Persistent;
                false
            } else {
                true
            }
        });
        if purged_persistent {
            self.flush_logged();
        }
        removed
    }

    /// Snapshot of live persistent grants.
    #[must_use]
    pub fn persistent_grants(&self) -> Vec<Grant> {
        self.grants
            .iter()
            .filter(|g| g.scope == GrantScope::Persistent && !g.is_expired())
            .map(|g| g.value().clone())
            .collect()
    }

    /// Number of stored grants, including expired ones not yet purged.
    #[must_use]
    pub fn len(&self) -> usize {
        self.grants.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    /// Write the persistent snapshot to the backend. Blocks on backend I/O.
    ///
    /// # Errors
    ///
    /// Returns the backend's error.
    pub fn flush(&self) -> PermissionResult<()> {
        let _guard = self
            .flush_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let snapshot = self.persistent_grants();
        self.persistence.save(&snapshot).inspect_err(|e| {
            tracing::warn!(error = %e, "failed to persist grants");
        })
    }

    fn flush_logged(&self) {
        // Failures are already logged by flush.
        let _ = self.flush();
    }

    fn purge_if_expired(&self, key: &GrantKey) {
        let removed = self.grants.remove_if(key, |_, g| g.is_expired());
        if let Some((_, grant)) = removed {
            tracing::debug!(grant = %grant.id, action = %grant.action, resource = %grant.resource, "dropped expired grant");
            if grant.scope == GrantScope::Persistent {
                self.flush_logged();
            }
        }
    }
}

impl Default for GrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GrantStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GrantStore")
            .field("count", &self.grants.len())
            .field("persistence", &self.persistence)
            .finish()
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
