//! Per-agent runtime permission spec.
//!
//! An [`AgentRuntimeSpec`] is loaded from configuration, compiled once, and
//! then shared read-only behind an `Arc`. Reloading replaces the whole value.

use serde::{Deserialize, Serialize};
use warden_core::{AccessKind, Decision};

use crate::decision::{PatternRuleSet, Verdict, VerdictSource};
use crate::pattern::{MatchMode, PatternError};

/// Default for rules that omit `default`: escalate to a human.
fn default_decision() -> Decision {
    Decision::Ask
}

/// Serialized shape of a file rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileRule {
    #[serde(default)]
    allow_patterns: Vec<String>,
    #[serde(default)]
    deny_patterns: Vec<String>,
    #[serde(default = "default_decision")]
    default: Decision,
    #[serde(default)]
    documentation_only: bool,
    #[serde(default)]
    require_approval: bool,
}

/// Serialized shape of the bash rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawBashRule {
    #[serde(default)]
    allow_patterns: Vec<String>,
    #[serde(default)]
    deny_patterns: Vec<String>,
    #[serde(default = "default_decision")]
    default: Decision,
}

/// Rule governing one kind of file access.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFileRule", into = "RawFileRule")]
pub struct FilePermissionRule {
    rules: PatternRuleSet,
    documentation_only: bool,
    require_approval: bool,
}

impl FilePermissionRule {
    /// Compile a file rule from path-mode patterns.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<A, D, S, T>(allow: A, deny: D, default: Decision) -> Result<Self, PatternError>
    where
        A: IntoIterator<Item = S>,
        D: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Ok(Self {
            rules: PatternRuleSet::new(MatchMode::Path, allow, deny, default)?,
            documentation_only: false,
            require_approval: false,
        })
    }

    /// A rule with no patterns.
    #[must_use]
    pub fn with_default(default: Decision) -> Self {
        Self {
            rules: PatternRuleSet::with_default(MatchMode::Path, default),
            documentation_only: false,
            require_approval: false,
        }
    }

    /// Restrict the rule to Markdown files.
    #[must_use]
    pub fn documentation_only(mut self) -> Self {
        self.documentation_only = true;
        self
    }

    /// Force every non-denied path through approval.
    #[must_use]
    pub fn require_approval(mut self) -> Self {
        self.require_approval = true;
        self
    }

    /// Evaluate a normalized, workspace-relative path.
    #[must_use]
    pub fn evaluate(&self, path: &str) -> Verdict {
        if self.documentation_only && !is_markdown(path) {
            return Verdict {
                decision: Decision::Deny,
                pattern: None,
                source: VerdictSource::DocumentationOnly,
            };
        }
        let verdict = self.rules.decide(path);
        if self.require_approval {
            verdict.force_ask()
        } else {
            verdict
        }
    }

    /// The compiled patterns.
    #[must_use]
    pub fn rules(&self) -> &PatternRuleSet {
        &self.rules
    }

    /// Whether only `.md` paths may pass.
    #[must_use]
    pub fn is_documentation_only(&self) -> bool {
        self.documentation_only
    }

    /// Whether every non-denied path escalates.
    #[must_use]
    pub fn is_require_approval(&self) -> bool {
        self.require_approval
    }
}

impl Default for FilePermissionRule {
    fn default() -> Self {
        Self::with_default(default_decision())
    }
}

impl TryFrom<RawFileRule> for FilePermissionRule {
    type Error = PatternError;

    fn try_from(raw: RawFileRule) -> Result<Self, Self::Error> {
        let mut rule = Self::new(raw.allow_patterns, raw.deny_patterns, raw.default)?;
        rule.documentation_only = raw.documentation_only;
        rule.require_approval = raw.require_approval;
        Ok(rule)
    }
}

impl From<FilePermissionRule> for RawFileRule {
    fn from(rule: FilePermissionRule) -> Self {
        Self {
            allow_patterns: rule.rules.allow_patterns().to_vec(),
            deny_patterns: rule.rules.deny_patterns().to_vec(),
            default: rule.rules.default_decision(),
            documentation_only: rule.documentation_only,
            require_approval: rule.require_approval,
        }
    }
}

fn is_markdown(path: &str) -> bool {
    path.len() >= 3
        && path
            .get(path.len().saturating_sub(3)..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".md"))
}

/// Rule governing command execution. Patterns use command matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBashRule", into = "RawBashRule")]
pub struct BashRule {
    rules: PatternRuleSet,
}

impl BashRule {
    /// Compile a bash rule.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<A, D, S, T>(allow: A, deny: D, default: Decision) -> Result<Self, PatternError>
    where
        A: IntoIterator<Item = S>,
        D: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Ok(Self {
            rules: PatternRuleSet::new(MatchMode::Command, allow, deny, default)?,
        })
    }

    /// A rule with no patterns.
    #[must_use]
    pub fn with_default(default: Decision) -> Self {
        Self {
            rules: PatternRuleSet::with_default(MatchMode::Command, default),
        }
    }

    /// Evaluate a space-joined command line.
    #[must_use]
    pub fn evaluate(&self, command_line: &str) -> Verdict {
        self.rules.decide(command_line)
    }

    /// The compiled patterns.
    #[must_use]
    pub fn rules(&self) -> &PatternRuleSet {
        &self.rules
    }
}

impl Default for BashRule {
    fn default() -> Self {
        Self::with_default(default_decision())
    }
}

impl TryFrom<RawBashRule> for BashRule {
    type Error = PatternError;

    fn try_from(raw: RawBashRule) -> Result<Self, Self::Error> {
        Self::new(raw.allow_patterns, raw.deny_patterns, raw.default)
    }
}

impl From<BashRule> for RawBashRule {
    fn from(rule: BashRule) -> Self {
        Self {
            allow_patterns: rule.rules.allow_patterns().to_vec(),
            deny_patterns: rule.rules.deny_patterns().to_vec(),
            default: rule.rules.default_decision(),
        }
    }
}

/// File rules, one per access family.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileRules {
    /// Governs reads and directory listings.
    #[serde(default)]
    pub read: FilePermissionRule,
    /// Governs file creation and overwrite.
    #[serde(default)]
    pub write: FilePermissionRule,
    /// Governs in-place edits.
    #[serde(default)]
    pub edit: FilePermissionRule,
}

/// The rule a file access is evaluated against.
#[derive(Debug, Clone, Copy)]
pub enum RuleRef<'a> {
    /// A file rule.
    File(&'a FilePermissionRule),
    /// The bash rule, for executing files.
    Bash(&'a BashRule),
}

impl RuleRef<'_> {
    /// Evaluate a normalized resource.
    #[must_use]
    pub fn evaluate(&self, resource: &str) -> Verdict {
        match self {
            Self::File(rule) => rule.evaluate(resource),
            Self::Bash(rule) => rule.evaluate(resource),
        }
    }

    /// Config path of the rule, e.g. `files.write`.
    #[must_use]
    pub fn name(&self, kind: AccessKind) -> &'static str {
        match (self, kind) {
            (Self::Bash(_), _) => "bash",
            (Self::File(_), AccessKind::Write) => "files.write",
            (Self::File(_), AccessKind::Edit) => "files.edit",
            (Self::File(_), _) => "files.read",
        }
    }
}

/// Permission spec for a single agent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentRuntimeSpec {
    /// File access rules.
    #[serde(default)]
    pub files: FileRules,
    /// Command execution rule.
    #[serde(default)]
    pub bash: BashRule,
}

impl AgentRuntimeSpec {
    /// Select the rule for a file access kind.
    ///
    /// Reads and listings share `files.read`; executing a file is governed
    /// by `bash` with the path as the command line.
    #[must_use]
    pub fn rule_for(&self, kind: AccessKind) -> RuleRef<'_> {
        match kind {
            AccessKind::Read | AccessKind::List => RuleRef::File(&self.files.read),
            AccessKind::Write => RuleRef::File(&self.files.write),
            AccessKind::Edit => RuleRef::File(&self.files.edit),
            AccessKind::Execute => RuleRef::Bash(&self.bash),
        }
    }
}
