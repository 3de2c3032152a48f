//! Permission manager: the facade tools call before acting.
//!
//! Each check runs the same pipeline:
//!
//! 1. Normalize the resource (workspace-relative path or joined command line)
//! 2. If the call names a tool, require the resource to lie inside that
//!    tool's declared bounds
//! 3. Evaluate the agent's rule for the access
//! 4. Allow proceeds, Deny fails, Ask escalates through the [`ApprovalBroker`]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use warden_core::{
    AccessKind, AgentId, ApprovalId, Decision, GrantId, GrantScope, PermissionError,
    PermissionResult, RiskLevel,
};
use warden_policy::{
    AgentRuntimeSpec, DeclarationRegistry, ToolPermissionSet, Verdict, VerdictSource,
    command_line, normalize_path,
};

use crate::broker::{ApprovalBroker, ApprovalOutcome};
use crate::descriptor::PermissionDescriptor;

/// Default approval timeouts per risk level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalTimeouts {
    /// Timeout for low-risk requests.
    pub low: Duration,
    /// Timeout for medium-risk requests.
    pub medium: Duration,
    /// Timeout for high-risk requests.
    pub high: Duration,
}

impl ApprovalTimeouts {
    /// The timeout for `risk`.
    #[must_use]
    pub fn for_risk(&self, risk: RiskLevel) -> Duration {
        match risk {
            RiskLevel::Low => self.low,
            RiskLevel::Medium => self.medium,
            RiskLevel::High => self.high,
        }
    }
}

impl Default for ApprovalTimeouts {
    fn default() -> Self {
        Self {
            low: Duration::from_secs(120),
            medium: Duration::from_secs(300),
            high: Duration::from_secs(600),
        }
    }
}

/// Per-call context supplied by the tool runtime.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Name of the calling tool. When set, its declaration bounds the call.
    pub tool: Option<String>,
    /// Cancelled when the caller stops waiting.
    pub cancel: CancellationToken,
    /// Why the agent is doing this, shown to the approver.
    pub reason: Option<String>,
    /// Overrides the risk-based approval timeout.
    pub timeout: Option<Duration>,
    /// Overrides the manager's default requested grant scope.
    pub scope: Option<GrantScope>,
}

impl CallContext {
    /// A context with no tool, bound to `cancel`.
    #[must_use]
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..Self::default()
        }
    }

    /// A context for `tool`, bound to `cancel`.
    #[must_use]
    pub fn for_tool(tool: impl Into<String>, cancel: CancellationToken) -> Self {
        Self {
            tool: Some(tool.into()),
            cancel,
            ..Self::default()
        }
    }

    /// Attach a reason shown to the approver.
    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Override the approval timeout. Zero waits indefinitely.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Request a specific grant scope.
    #[must_use]
    pub fn with_scope(mut self, scope: GrantScope) -> Self {
        self.scope = Some(scope);
        self
    }
}

/// How a successful check obtained access.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessProof {
    /// The agent's policy allowed it outright.
    Policy {
        /// The allow pattern that matched, if any.
        pattern: Option<String>,
    },
    /// An existing grant covered it.
    Grant {
        /// The grant that matched.
        grant_id: GrantId,
        /// Its scope.
        scope: GrantScope,
    },
    /// A human approved it.
    Approval {
        /// The approved request.
        approval_id: ApprovalId,
        /// Effective scope.
        scope: GrantScope,
    },
}

impl From<ApprovalOutcome> for AccessProof {
    fn from(outcome: ApprovalOutcome) -> Self {
        match outcome {
            ApprovalOutcome::Granted { grant_id, scope } => Self::Grant { grant_id, scope },
            ApprovalOutcome::Approved { approval_id, scope } => {
                Self::Approval { approval_id, scope }
            },
        }
    }
}

/// Facade over agent specs, tool declarations and the approval broker.
///
/// Agent specs are immutable snapshots behind `Arc`; installing a spec
/// replaces the snapshot and in-flight checks keep the one they started with.
#[derive(Debug)]
pub struct PermissionManager {
    workspace_root: PathBuf,
    specs: RwLock<HashMap<AgentId, Arc<AgentRuntimeSpec>>>,
    declarations: Arc<DeclarationRegistry>,
    broker: Arc<ApprovalBroker>,
    timeouts: ApprovalTimeouts,
    default_scope: GrantScope,
}

/// The rule evaluation for one check, before escalation.
struct Evaluation {
    descriptor: PermissionDescriptor,
    verdict: Verdict,
    rule_name: &'static str,
    risk: RiskLevel,
}

impl PermissionManager {
    /// Create a manager for the workspace at `workspace_root`.
    #[must_use]
    pub fn new(workspace_root: impl Into<PathBuf>, broker: Arc<ApprovalBroker>) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            specs: RwLock::new(HashMap::new()),
            declarations: Arc::new(DeclarationRegistry::new()),
            broker,
            timeouts: ApprovalTimeouts::default(),
            default_scope: GrantScope::OneTime,
        }
    }

    /// Use `declarations` for tool bound checks.
    #[must_use]
    pub fn with_declarations(mut self, declarations: Arc<DeclarationRegistry>) -> Self {
        self.declarations = declarations;
        self
    }

    /// Override the per-risk approval timeouts.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: ApprovalTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Scope requested when a call does not specify one.
    #[must_use]
    pub fn with_default_scope(mut self, scope: GrantScope) -> Self {
        self.default_scope = scope;
        self
    }

    /// Install or replace the spec for one agent.
    pub fn install_spec(&self, agent_id: AgentId, spec: AgentRuntimeSpec) {
        self.specs
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(agent_id, Arc::new(spec));
    }

    /// Replace every agent spec at once.
    pub fn replace_specs(&self, specs: HashMap<AgentId, AgentRuntimeSpec>) {
        let specs = specs
            .into_iter()
            .map(|(id, spec)| (id, Arc::new(spec)))
            .collect();
        *self.specs.write().unwrap_or_else(PoisonError::into_inner) = specs;
    }

    /// The current spec snapshot for an agent.
    #[must_use]
    pub fn spec(&self, agent_id: &AgentId) -> Option<Arc<AgentRuntimeSpec>> {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(agent_id)
            .cloned()
    }

    /// The approval broker.
    #[must_use]
    pub fn broker(&self) -> &Arc<ApprovalBroker> {
        &self.broker
    }

    /// The workspace root paths are normalized against.
    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    fn require_spec(&self, agent_id: &AgentId) -> PermissionResult<Arc<AgentRuntimeSpec>> {
        self.spec(agent_id)
            .ok_or_else(|| PermissionError::UnknownAgent {
                agent: agent_id.to_string(),
            })
    }

    fn tool_set(&self, tool: &str) -> PermissionResult<&ToolPermissionSet> {
        self.declarations
            .get(tool)
            .ok_or_else(|| PermissionError::UnknownTool {
                tool: tool.to_owned(),
            })
    }

    /// Check a file access.
    ///
    /// # Errors
    ///
    /// - Structural: unknown tool or agent, or a path outside the tool's
    ///   declared bounds
    /// - [`PermissionError::Denied`] when policy or the approver refuses
    /// - timeout, cancellation or transport errors from escalation
    pub async fn check_file_access(
        &self,
        ctx: &CallContext,
        agent_id: &AgentId,
        kind: AccessKind,
        path: impl AsRef<Path>,
    ) -> PermissionResult<AccessProof> {
        let resource = normalize_path(&self.workspace_root, path.as_ref());
        let mut descriptor = PermissionDescriptor::file(kind, resource);

        if let Some(tool) = ctx.tool.as_deref() {
            let entry = self
                .tool_set(tool)?
                .file_entry(&self.workspace_root, &descriptor.resource, kind)
                .ok_or_else(|| PermissionError::OutOfBounds {
                    tool: tool.to_owned(),
                    action: descriptor.action.clone(),
                    resource: descriptor.resource.clone(),
                })?;
            descriptor.requires_hitl = entry.hitl_required;
        }

        let spec = self.require_spec(agent_id)?;
        let rule = spec.rule_for(kind);
        let mut verdict = rule.evaluate(&descriptor.resource);
        if descriptor.requires_hitl {
            verdict = verdict.force_ask();
        }
        descriptor.requires_hitl = verdict.decision == Decision::Ask;

        self.settle(
            ctx,
            agent_id,
            Evaluation {
                verdict,
                rule_name: rule.name(kind),
                risk: kind.risk(),
                descriptor,
            },
        )
        .await
    }

    /// Check execution of `command` with `args`.
    ///
    /// Only the names of `env` are used, to tell the approver which variables
    /// are being set. Values are never logged or shown.
    ///
    /// # Errors
    ///
    /// - [`PermissionError::EmptyCommand`] if `command` is blank
    /// - Structural: unknown tool or agent, or a command outside the tool's
    ///   declared executables
    /// - [`PermissionError::Denied`] when policy or the approver refuses
    /// - timeout, cancellation or transport errors from escalation
    pub async fn check_executable<S: AsRef<str>>(
        &self,
        ctx: &CallContext,
        agent_id: &AgentId,
        command: &str,
        args: &[S],
        env: &HashMap<String, String>,
    ) -> PermissionResult<AccessProof> {
        if command.trim().is_empty() {
            return Err(PermissionError::EmptyCommand);
        }
        let mut descriptor = PermissionDescriptor::command(command_line(command, args));

        if let Some(tool) = ctx.tool.as_deref() {
            let entry = self
                .tool_set(tool)?
                .executable_entry(command.trim(), args)
                .ok_or_else(|| PermissionError::OutOfBounds {
                    tool: tool.to_owned(),
                    action: descriptor.action.clone(),
                    resource: descriptor.resource.clone(),
                })?;
            descriptor.requires_hitl = entry.hitl_required;
        }

        let spec = self.require_spec(agent_id)?;
        let mut verdict = spec.bash.evaluate(&descriptor.resource);
        if descriptor.requires_hitl {
            verdict = verdict.force_ask();
        }
        descriptor.requires_hitl = verdict.decision == Decision::Ask;

        let mut env_keys: Vec<&str> = env.keys().map(String::as_str).collect();
        env_keys.sort_unstable();
        let ctx = if env_keys.is_empty() {
            ctx.clone()
        } else {
            let base = ctx
                .reason
                .clone()
                .unwrap_or_else(|| default_reason(agent_id, &descriptor));
            ctx.clone()
                .with_reason(format!("{base} (env: {})", env_keys.join(", ")))
        };

        self.settle(
            &ctx,
            agent_id,
            Evaluation {
                verdict,
                rule_name: "bash",
                risk: RiskLevel::Medium,
                descriptor,
            },
        )
        .await
    }

    /// Escalate `descriptor` to a human unless a grant covers it.
    ///
    /// Used by tools that need an explicit approval step regardless of
    /// policy.
    ///
    /// # Errors
    ///
    /// Same as [`ApprovalBroker::require_approval`].
    pub async fn require_approval(
        &self,
        ctx: &CallContext,
        agent_id: &AgentId,
        descriptor: &PermissionDescriptor,
        risk: RiskLevel,
    ) -> PermissionResult<AccessProof> {
        let reason = ctx
            .reason
            .clone()
            .unwrap_or_else(|| default_reason(agent_id, descriptor));
        let timeout = ctx
            .timeout
            .unwrap_or_else(|| self.timeouts.for_risk(risk));
        self.broker
            .require_approval(
                &ctx.cancel,
                agent_id,
                descriptor,
                &reason,
                ctx.scope.unwrap_or(self.default_scope),
                risk,
                timeout,
            )
            .await
            .map(AccessProof::from)
    }

    async fn settle(
        &self,
        ctx: &CallContext,
        agent_id: &AgentId,
        eval: Evaluation,
    ) -> PermissionResult<AccessProof> {
        let Evaluation {
            descriptor,
            verdict,
            rule_name,
            risk,
        } = eval;

        tracing::info!(
            agent = %agent_id,
            action = %descriptor.action,
            resource = %descriptor.resource,
            decision = %verdict.decision,
            pattern = ?verdict.pattern,
            rule = rule_name,
            "permission decision"
        );

        match verdict.decision {
            Decision::Allow => Ok(AccessProof::Policy {
                pattern: verdict.pattern,
            }),
            Decision::Deny => Err(PermissionError::Denied {
                reason: deny_reason(&verdict, rule_name),
                rule: verdict.rule_label().or_else(|| Some(rule_name.to_owned())),
                action: descriptor.action,
                resource: descriptor.resource,
            }),
            Decision::Ask => {
                self.require_approval(ctx, agent_id, &descriptor, risk)
                    .await
            },
        }
    }
}

fn default_reason(agent_id: &AgentId, descriptor: &PermissionDescriptor) -> String {
    format!(
        "agent {agent_id} requests {} on {}",
        descriptor.action, descriptor.resource
    )
}

fn deny_reason(verdict: &Verdict, rule_name: &str) -> String {
    match verdict.source {
        VerdictSource::DenyPattern => format!("matched a deny pattern in {rule_name}"),
        VerdictSource::DocumentationOnly => {
            format!("{rule_name} only permits Markdown files")
        },
        VerdictSource::Default | VerdictSource::AllowPattern => {
            format!("{rule_name} denies by default")
        },
    }
}

#[cfg(test)]
#[path = "manager_tests.rs"]
mod tests;
