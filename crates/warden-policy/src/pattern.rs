//! Glob pattern sets matched against normalized resource strings.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use serde::{Serialize, Serializer};
use std::fmt;

/// How `*` treats path separators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// `*` stays within one path segment; `**` crosses segments.
    Path,
    /// `*` matches any run of characters, including `/` and spaces.
    Command,
}

/// A pattern that failed to compile.
#[derive(Debug, thiserror::Error)]
#[error("invalid pattern '{pattern}': {source}")]
pub struct PatternError {
    /// The offending pattern.
    pub pattern: String,
    /// The glob compiler error.
    #[source]
    pub source: globset::Error,
}

impl From<PatternError> for warden_core::PermissionError {
    fn from(e: PatternError) -> Self {
        Self::InvalidPattern {
            reason: e.source.to_string(),
            pattern: e.pattern,
        }
    }
}

/// Compile a single glob for the given mode.
///
/// # Errors
///
/// Returns a [`PatternError`] if the glob syntax is invalid.
pub fn compile_glob(pattern: &str, mode: MatchMode) -> Result<Glob, PatternError> {
    GlobBuilder::new(pattern)
        .literal_separator(mode == MatchMode::Path)
        .backslash_escape(true)
        .build()
        .map_err(|source| PatternError {
            pattern: pattern.to_owned(),
            source,
        })
}

/// An ordered, compiled list of glob patterns.
///
/// Matching is case-sensitive. An empty set never matches.
#[derive(Clone)]
pub struct PatternSet {
    patterns: Vec<String>,
    set: GlobSet,
    mode: MatchMode,
}

impl PatternSet {
    /// Compile `patterns` in declaration order.
    ///
    /// # Errors
    ///
    /// Returns the first pattern that fails to compile.
    pub fn new<I, S>(mode: MatchMode, patterns: I) -> Result<Self, PatternError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();
        let mut builder = GlobSetBuilder::new();
        for pattern in &patterns {
            builder.add(compile_glob(pattern, mode)?);
        }
        let set = builder.build().map_err(|source| PatternError {
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(Self {
            patterns,
            set,
            mode,
        })
    }

    /// A set that matches nothing.
    #[must_use]
    pub fn empty(mode: MatchMode) -> Self {
        Self {
            patterns: Vec::new(),
            set: GlobSet::empty(),
            mode,
        }
    }

    /// Whether any pattern matches `resource`.
    #[must_use]
    pub fn matches(&self, resource: &str) -> bool {
        !self.patterns.is_empty() && self.set.is_match(resource)
    }

    /// The first pattern, in declaration order, that matches `resource`.
    #[must_use]
    pub fn first_match(&self, resource: &str) -> Option<&str> {
        self.set
            .matches(resource)
            .into_iter()
            .min()
            .and_then(|idx| self.patterns.get(idx))
            .map(String::as_str)
    }

    /// The source patterns.
    #[must_use]
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// The matching mode this set was compiled with.
    #[must_use]
    pub fn mode(&self) -> MatchMode {
        self.mode
    }

    /// Whether the set has no patterns.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl fmt::Debug for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternSet")
            .field("mode", &self.mode)
            .field("patterns", &self.patterns)
            .finish()
    }
}

impl PartialEq for PatternSet {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode && self.patterns == other.patterns
    }
}

impl Serialize for PatternSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.patterns)
    }
}

/// Whether `resource` matches any of `patterns`.
///
/// Patterns that fail to compile never match.
#[must_use]
pub fn matches_any<S: AsRef<str>>(resource: &str, patterns: &[S], mode: MatchMode) -> bool {
    patterns.iter().any(|p| {
        compile_glob(p.as_ref(), mode)
            .map(|g| g.compile_matcher().is_match(resource))
            .unwrap_or(false)
    })
}

#[cfg(test)]
#[path = "pattern_tests.rs"]
mod tests;
