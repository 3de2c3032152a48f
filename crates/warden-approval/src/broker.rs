//! Approval broker: the human-in-the-loop state machine.
//!
//! A request moves `Pending -> Approved | Denied | Expired | Cancelled`; every
//! state after `Pending` is terminal. The broker:
//!
//! 1. Short-circuits through the [`GrantStore`] when a grant already covers
//!    the request.
//! 2. Coalesces concurrent requests for the same `(agent, action, resource)`
//!    into one [`PendingApproval`], published once to the [`ApprovalSink`].
//! 3. Waits for the first of a resolution, the request deadline, or the
//!    caller's cancellation token.
//!
//! A pending request never outlives its last waiter: when every waiter has
//! detached (cancelled, or its future was dropped) the request is cancelled
//! and withdrawn from the surface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use warden_core::{
    AgentId, ApprovalId, GrantId, GrantScope, PermissionError, PermissionResult, RiskLevel,
    Timestamp,
};

use crate::descriptor::PermissionDescriptor;
use crate::grant::{Grant, GrantKey, GrantStore};

/// A request waiting for a human decision, as shown to the approval surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Request identifier, used to resolve it.
    pub id: ApprovalId,
    /// Agent asking for access.
    pub agent_id: AgentId,
    /// What is being accessed.
    pub descriptor: PermissionDescriptor,
    /// Why the agent needs it.
    pub reason: String,
    /// Grant scope requested. The resolver may override it.
    pub scope: GrantScope,
    /// Risk of the action.
    pub risk: RiskLevel,
    /// When the request was created.
    pub created_at: Timestamp,
    /// When the request expires (None = waits until cancelled).
    pub expires_at: Option<Timestamp>,
}

/// A human decision on a pending request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum Resolution {
    /// Allow the action, optionally overriding the requested scope.
    Approve {
        /// Scope to grant instead of the requested one.
        #[serde(default)]
        scope: Option<GrantScope>,
    },
    /// Refuse the action.
    Deny {
        /// Why it was refused.
        reason: String,
    },
}

impl Resolution {
    /// Approve with the requested scope.
    #[must_use]
    pub fn approve() -> Self {
        Self::Approve { scope: None }
    }

    /// Approve with an explicit scope.
    #[must_use]
    pub fn approve_with(scope: GrantScope) -> Self {
        Self::Approve { scope: Some(scope) }
    }

    /// Deny with a reason.
    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self::Deny {
            reason: reason.into(),
        }
    }
}

/// Lifecycle state of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalState {
    /// Waiting for a decision.
    Pending,
    /// Approved with the effective scope.
    Approved {
        /// Scope the approval was granted with.
        scope: GrantScope,
    },
    /// Refused.
    Denied {
        /// Why it was refused.
        reason: String,
    },
    /// The deadline passed.
    Expired,
    /// Every waiter gave up, or the surface failed.
    Cancelled,
}

impl ApprovalState {
    /// Whether the state is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// How a `require_approval` call was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    /// An existing grant covered the request; no human was asked.
    Granted {
        /// The grant that matched.
        grant_id: GrantId,
        /// Its scope.
        scope: GrantScope,
    },
    /// A human approved the request.
    Approved {
        /// The request that was approved.
        approval_id: ApprovalId,
        /// Effective scope.
        scope: GrantScope,
    },
}

/// The surface that shows pending requests to a human.
///
/// Implementations publish the request and return; the decision arrives later
/// through [`ApprovalBroker::resolve`].
#[async_trait]
pub trait ApprovalSink: Send + Sync {
    /// Publish a new pending request.
    ///
    /// # Errors
    ///
    /// An error finalizes the request as cancelled and is returned to the
    /// waiting caller unchanged.
    async fn submit(&self, request: PendingApproval) -> PermissionResult<()>;

    /// A request expired or was cancelled and should be cleared from view.
    fn withdraw(&self, _id: ApprovalId) {}
}

struct PendingEntry {
    request: PendingApproval,
    key: GrantKey,
    state: watch::Sender<ApprovalState>,
    waiters: usize,
    deadline: Option<Instant>,
    timeout: Duration,
}

#[derive(Default)]
struct PendingTable {
    by_id: HashMap<ApprovalId, PendingEntry>,
    by_key: HashMap<GrantKey, ApprovalId>,
}

impl PendingTable {
    fn remove(&mut self, id: ApprovalId) -> Option<PendingEntry> {
        let entry = self.by_id.remove(&id)?;
        if self.by_key.get(&entry.key) == Some(&id) {
            self.by_key.remove(&entry.key);
        }
        Some(entry)
    }
}

/// What a waiter needs after joining or creating a request.
struct Ticket {
    id: ApprovalId,
    state: watch::Receiver<ApprovalState>,
    deadline: Option<Instant>,
    timeout: Duration,
    /// Set when this waiter created the request and must publish it.
    publish: Option<PendingApproval>,
}

/// Orchestrates approvals between callers, the grant store and the surface.
pub struct ApprovalBroker {
    grants: Arc<GrantStore>,
    sink: RwLock<Option<Arc<dyn ApprovalSink>>>,
    pending: Mutex<PendingTable>,
}

impl ApprovalBroker {
    /// Create a broker over `grants` with no surface registered.
    #[must_use]
    pub fn new(grants: Arc<GrantStore>) -> Self {
        Self {
            grants,
            sink: RwLock::new(None),
            pending: Mutex::new(PendingTable::default()),
        }
    }

    /// Register the approval surface, replacing any previous one.
    pub fn set_sink(&self, sink: Arc<dyn ApprovalSink>) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = Some(sink);
    }

    /// Unregister the approval surface. Later escalations fail structurally.
    pub fn clear_sink(&self) {
        *self.sink.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// The grant store consulted before escalating.
    #[must_use]
    pub fn grants(&self) -> &Arc<GrantStore> {
        &self.grants
    }

    fn sink(&self) -> Option<Arc<dyn ApprovalSink>> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(|e| {
            tracing::warn!("pending approval table lock poisoned, recovering");
            e.into_inner()
        })
    }

    /// Require a human decision for `descriptor`, unless a grant covers it.
    ///
    /// `timeout` applies when this call creates the request; callers that
    /// join an existing request share its deadline. A zero timeout waits
    /// until resolution or cancellation.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::NoApprovalSurface`] if no sink is registered
    /// - [`PermissionError::Denied`] if the human refused
    /// - [`PermissionError::ApprovalTimeout`] if the deadline passed
    /// - [`PermissionError::ApprovalCancelled`] if `cancel` fired or every
    ///   waiter detached
    /// - the sink's own error if publishing failed
    #[allow(clippy::too_many_arguments)]
    pub async fn require_approval(
        &self,
        cancel: &CancellationToken,
        agent_id: &AgentId,
        descriptor: &PermissionDescriptor,
        reason: &str,
        scope: GrantScope,
        risk: RiskLevel,
        timeout: Duration,
    ) -> PermissionResult<ApprovalOutcome> {
        if let Some(grant) = self
            .grants
            .take(agent_id, &descriptor.action, &descriptor.resource)
        {
            tracing::debug!(
                agent = %agent_id,
                action = %descriptor.action,
                resource = %descriptor.resource,
                grant = %grant.id,
                scope = %grant.scope,
                "approval satisfied by existing grant"
            );
            return Ok(ApprovalOutcome::Granted {
                grant_id: grant.id,
                scope: grant.scope,
            });
        }

        let cancelled = || PermissionError::ApprovalCancelled {
            action: descriptor.action.clone(),
            resource: descriptor.resource.clone(),
        };

        let Some(sink) = self.sink() else {
            return Err(PermissionError::NoApprovalSurface {
                action: descriptor.action.clone(),
                resource: descriptor.resource.clone(),
            });
        };

        if cancel.is_cancelled() {
            return Err(cancelled());
        }

        let mut ticket = self.join_or_create(agent_id, descriptor, reason, scope, risk, timeout);
        let guard = WaiterGuard {
            broker: self,
            id: ticket.id,
        };

        if let Some(request) = ticket.publish.take() {
            tracing::info!(
                approval = %request.id,
                agent = %agent_id,
                action = %descriptor.action,
                resource = %descriptor.resource,
                risk = %risk,
                "approval requested"
            );
            let submitted = tokio::select! {
                result = sink.submit(request) => result,
                () = cancel.cancelled() => return Err(cancelled()),
            };
            if let Err(e) = submitted {
                tracing::warn!(approval = %ticket.id, error = %e, "approval surface rejected request");
                self.finish(ticket.id, ApprovalState::Cancelled);
                return Err(e);
            }
        } else {
            tracing::debug!(approval = %ticket.id, "joined pending approval");
        }

        // None means the deadline passed before a terminal state was observed.
        let settled = tokio::select! {
            biased;
            state = ticket.state.wait_for(ApprovalState::is_terminal) => {
                Some(state.map_or(ApprovalState::Cancelled, |s| (*s).clone()))
            },
            () = cancel.cancelled() => return Err(cancelled()),
            () = sleep_until(ticket.deadline) => None,
        };
        let state = match settled {
            Some(state) => state,
            None => {
                // A resolution may have landed at the same instant; the
                // channel holds whichever terminal state won.
                self.finish(ticket.id, ApprovalState::Expired);
                ticket.state.borrow().clone()
            },
        };
        drop(guard);

        match state {
            ApprovalState::Approved { scope } => Ok(ApprovalOutcome::Approved {
                approval_id: ticket.id,
                scope,
            }),
            ApprovalState::Denied { reason } => Err(PermissionError::Denied {
                action: descriptor.action.clone(),
                resource: descriptor.resource.clone(),
                rule: None,
                reason,
            }),
            ApprovalState::Expired => Err(PermissionError::ApprovalTimeout {
                action: descriptor.action.clone(),
                resource: descriptor.resource.clone(),
                timeout_ms: u64::try_from(ticket.timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            ApprovalState::Cancelled | ApprovalState::Pending => Err(cancelled()),
        }
    }

    fn join_or_create(
        &self,
        agent_id: &AgentId,
        descriptor: &PermissionDescriptor,
        reason: &str,
        scope: GrantScope,
        risk: RiskLevel,
        timeout: Duration,
    ) -> Ticket {
        let key = GrantKey::new(agent_id, &descriptor.action, &descriptor.resource);
        let mut table = self.table();

        if let Some(id) = table.by_key.get(&key).copied()
            && let Some(entry) = table.by_id.get_mut(&id)
        {
            entry.waiters = entry.waiters.saturating_add(1);
            return Ticket {
                id,
                state: entry.state.subscribe(),
                deadline: entry.deadline,
                timeout: entry.timeout,
                publish: None,
            };
        }

        let (deadline, expires_at) = if timeout.is_zero() {
            (None, None)
        } else {
            (
                Instant::now().checked_add(timeout),
                Timestamp::after(timeout),
            )
        };
        let request = PendingApproval {
            id: ApprovalId::new(),
            agent_id: agent_id.clone(),
            descriptor: descriptor.clone(),
            reason: reason.to_owned(),
            scope,
            risk,
            created_at: Timestamp::now(),
            expires_at,
        };
        let id = request.id;
        let (tx, rx) = watch::channel(ApprovalState::Pending);
        table.by_key.insert(key.clone(), id);
        table.by_id.insert(
            id,
            PendingEntry {
                request: request.clone(),
                key,
                state: tx,
                waiters: 1,
                deadline,
                timeout,
            },
        );

        Ticket {
            id,
            state: rx,
            deadline,
            timeout,
            publish: Some(request),
        }
    }

    /// Resolve a pending request.
    ///
    /// Approvals with a session or persistent scope store one grant for the
    /// key before waiters are released; one-time approvals authorize only the
    /// calls currently waiting.
    ///
    /// A persistent approval saves the grant snapshot before returning, so
    /// this blocks on the persistence backend.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::UnknownApproval`] if `id` is unknown or already final
    /// - a storage error if a persistent grant could not be saved; waiters
    ///   are still released as approved
    pub fn resolve(&self, id: ApprovalId, resolution: Resolution) -> PermissionResult<()> {
        let entry = self
            .table()
            .remove(id)
            .ok_or_else(|| PermissionError::UnknownApproval { id: id.to_string() })?;

        let request = &entry.request;
        let (state, stored) = match resolution {
            Resolution::Approve { scope } => {
                let scope = scope.unwrap_or(request.scope);
                let stored = if scope.is_cached() {
                    self.grants.put(Grant::new(
                        request.agent_id.clone(),
                        request.descriptor.action.clone(),
                        request.descriptor.resource.clone(),
                        scope,
                    ))
                } else {
                    Ok(())
                };
                (ApprovalState::Approved { scope }, stored)
            },
            Resolution::Deny { reason } => (ApprovalState::Denied { reason }, Ok(())),
        };

        tracing::info!(
            approval = %id,
            agent = %request.agent_id,
            action = %request.descriptor.action,
            resource = %request.descriptor.resource,
            outcome = ?state,
            waiters = entry.waiters,
            "approval resolved"
        );
        entry.state.send_replace(state);
        stored
    }

    /// Move a pending request to a terminal state and withdraw it.
    ///
    /// Returns `false` if the request had already finished.
    fn finish(&self, id: ApprovalId, state: ApprovalState) -> bool {
        let Some(entry) = self.table().remove(id) else {
            return false;
        };
        self.settle(id, &entry, state);
        true
    }

    /// Publish the terminal state of an entry already removed from the table.
    fn settle(&self, id: ApprovalId, entry: &PendingEntry, state: ApprovalState) {
        tracing::info!(approval = %id, outcome = ?state, "approval finished without resolution");
        entry.state.send_replace(state);
        if let Some(sink) = self.sink() {
            sink.withdraw(id);
        }
    }

    /// Release one waiter; the last one out cancels the request.
    ///
    /// The entry leaves the table under the same lock that sees the count
    /// reach zero, so a caller arriving afterwards starts a new request.
    fn detach(&self, id: ApprovalId) {
        let released = {
            let mut table = self.table();
            let last = table.by_id.get_mut(&id).is_some_and(|entry| {
                entry.waiters = entry.waiters.saturating_sub(1);
                entry.waiters == 0
            });
            if last { table.remove(id) } else { None }
        };
        if let Some(entry) = released {
            self.settle(id, &entry, ApprovalState::Cancelled);
        }
    }

    /// Snapshot of outstanding requests, oldest first.
    #[must_use]
    pub fn pending(&self) -> Vec<PendingApproval> {
        let mut requests: Vec<_> = self
            .table()
            .by_id
            .values()
            .map(|e| e.request.clone())
            .collect();
        requests.sort_by_key(|r| r.created_at);
        requests
    }

    /// Number of outstanding requests.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table().by_id.len()
    }
}

impl fmt::Debug for ApprovalBroker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalBroker")
            .field("grants", &self.grants)
            .field("has_sink", &self.sink().is_some())
            .field("pending", &self.pending_count())
            .finish()
    }
}

/// Detaches a waiter however its wait ends, including when the future is dropped.
struct WaiterGuard<'a> {
    broker: &'a ApprovalBroker,
    id: ApprovalId,
}

impl Drop for WaiterGuard<'_> {
    fn drop(&mut self) {
        self.broker.detach(self.id);
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "broker_tests.rs"]
mod tests;
