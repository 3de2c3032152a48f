//! Allow/deny/ask evaluation over pattern rule sets.
//!
//! Precedence is fixed: a deny match wins, then an allow match, then the
//! rule's default. The pattern that decided the outcome is reported for
//! audit, taken as the first match in declaration order.

use serde::{Deserialize, Serialize};
use warden_core::Decision;

use crate::pattern::{MatchMode, PatternError, PatternSet, compile_glob};

/// What produced a [`Verdict`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerdictSource {
    /// A deny pattern matched.
    DenyPattern,
    /// An allow pattern matched.
    AllowPattern,
    /// Nothing matched; the rule default applied.
    Default,
    /// A documentation-only rule refused a non-Markdown path.
    DocumentationOnly,
}

/// Result of evaluating one resource against one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// The decision.
    pub decision: Decision,
    /// The pattern that matched, if one did.
    pub pattern: Option<String>,
    /// What produced the decision.
    pub source: VerdictSource,
}

impl Verdict {
    fn from_default(decision: Decision) -> Self {
        Self {
            decision,
            pattern: None,
            source: VerdictSource::Default,
        }
    }

    /// Label naming the rule behind this verdict, for error messages.
    #[must_use]
    pub fn rule_label(&self) -> Option<String> {
        match self.source {
            VerdictSource::DocumentationOnly => Some("documentation_only".to_owned()),
            VerdictSource::Default => None,
            VerdictSource::DenyPattern | VerdictSource::AllowPattern => self.pattern.clone(),
        }
    }

    /// Apply an "always ask" override. Deny is never downgraded.
    #[must_use]
    pub fn force_ask(mut self) -> Self {
        self.decision = self.decision.force_ask();
        self
    }
}

/// Evaluate `resource` against raw pattern lists.
///
/// Deny patterns that fail to compile fail closed: the first such pattern
/// (in order) that is reached before a real deny match produces a deny.
/// Allow patterns that fail to compile never match.
#[must_use]
pub fn decide_by_patterns<A, D>(
    resource: &str,
    allow: &[A],
    deny: &[D],
    default: Decision,
    mode: MatchMode,
) -> Verdict
where
    A: AsRef<str>,
    D: AsRef<str>,
{
    for pattern in deny {
        let pattern = pattern.as_ref();
        let hit = match compile_glob(pattern, mode) {
            Ok(glob) => glob.compile_matcher().is_match(resource),
            Err(e) => {
                tracing::warn!(pattern, error = %e, "invalid deny pattern, failing closed");
                true
            },
        };
        if hit {
            return Verdict {
                decision: Decision::Deny,
                pattern: Some(pattern.to_owned()),
                source: VerdictSource::DenyPattern,
            };
        }
    }

    for pattern in allow {
        let pattern = pattern.as_ref();
        if let Ok(glob) = compile_glob(pattern, mode)
            && glob.compile_matcher().is_match(resource)
        {
            return Verdict {
                decision: Decision::Allow,
                pattern: Some(pattern.to_owned()),
                source: VerdictSource::AllowPattern,
            };
        }
    }

    Verdict::from_default(default)
}

/// A compiled allow/deny/default rule.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternRuleSet {
    allow: PatternSet,
    deny: PatternSet,
    default: Decision,
}

impl PatternRuleSet {
    /// Compile a rule set.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<A, D, S, T>(
        mode: MatchMode,
        allow: A,
        deny: D,
        default: Decision,
    ) -> Result<Self, PatternError>
    where
        A: IntoIterator<Item = S>,
        D: IntoIterator<Item = T>,
        S: Into<String>,
        T: Into<String>,
    {
        Ok(Self {
            allow: PatternSet::new(mode, allow)?,
            deny: PatternSet::new(mode, deny)?,
            default,
        })
    }

    /// A rule with no patterns that always yields `default`.
    #[must_use]
    pub fn with_default(mode: MatchMode, default: Decision) -> Self {
        Self {
            allow: PatternSet::empty(mode),
            deny: PatternSet::empty(mode),
            default,
        }
    }

    /// Evaluate `resource`.
    #[must_use]
    pub fn decide(&self, resource: &str) -> Verdict {
        if let Some(pattern) = self.deny.first_match(resource) {
            return Verdict {
                decision: Decision::Deny,
                pattern: Some(pattern.to_owned()),
                source: VerdictSource::DenyPattern,
            };
        }
        if let Some(pattern) = self.allow.first_match(resource) {
            return Verdict {
                decision: Decision::Allow,
                pattern: Some(pattern.to_owned()),
                source: VerdictSource::AllowPattern,
            };
        }
        Verdict::from_default(self.default)
    }

    /// Allow patterns in declaration order.
    #[must_use]
    pub fn allow_patterns(&self) -> &[String] {
        self.allow.patterns()
    }

    /// Deny patterns in declaration order.
    #[must_use]
    pub fn deny_patterns(&self) -> &[String] {
        self.deny.patterns()
    }

    /// The fallback decision.
    #[must_use]
    pub fn default_decision(&self) -> Decision {
        self.default
    }
}

#[cfg(test)]
#[path = "decision_tests.rs"]
mod tests;
