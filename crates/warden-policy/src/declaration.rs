//! Tool permission declarations.
//!
//! Every tool states the minimum set of file-system and executable
//! permissions it needs. Declarations are validated once, when the tool is
//! registered; a tool with an invalid declaration is excluded from the
//! registry and can never pass a bound check.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use warden_core::{AccessKind, PermissionError};

use crate::normalize::normalize_path;
use crate::pattern::{MatchMode, PatternError, PatternSet};

/// Why a declaration was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeclarationError {
    /// Neither file-system nor executable permissions were declared.
    #[error("permission set is empty")]
    EmptyPermissionSet,

    /// A file-system entry with an empty base path asks for write or execute.
    #[error("file_system[{index}] has an empty base path with {kind} access")]
    AmbiguousBasePath {
        /// Index of the offending entry.
        index: usize,
        /// The access kind that makes the empty base ambiguous.
        kind: AccessKind,
    },

    /// A file-system entry lists no access kinds.
    #[error("file_system[{index}] declares no access kinds")]
    NoAccessKinds {
        /// Index of the offending entry.
        index: usize,
    },

    /// An executable entry has an empty command.
    #[error("executables[{index}] has an empty command")]
    EmptyExecutable {
        /// Index of the offending entry.
        index: usize,
    },

    /// An executable's argument pattern does not compile.
    #[error("executables[{index}] has invalid argument pattern '{pattern}'")]
    InvalidArgPattern {
        /// Index of the offending entry.
        index: usize,
        /// The pattern.
        pattern: String,
    },
}

impl DeclarationError {
    /// Convert into the structural permission error for `tool`.
    #[must_use]
    pub fn for_tool(&self, tool: &str) -> PermissionError {
        PermissionError::InvalidDeclaration {
            tool: tool.to_owned(),
            reason: self.to_string(),
        }
    }
}

/// Access to files below a base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystemPermission {
    /// Base path, workspace-relative or absolute. Empty means the workspace root.
    pub base_path: String,
    /// Access kinds granted below the base path.
    pub kinds: Vec<AccessKind>,
    /// Force approval for accesses covered by this entry.
    #[serde(default)]
    pub hitl_required: bool,
}

impl FileSystemPermission {
    /// Declare access below `base_path`.
    #[must_use]
    pub fn new(base_path: impl Into<String>, kinds: impl Into<Vec<AccessKind>>) -> Self {
        Self {
            base_path: base_path.into(),
            kinds: kinds.into(),
            hitl_required: false,
        }
    }

    /// Require approval for every covered access.
    #[must_use]
    pub fn with_hitl(mut self) -> Self {
        self.hitl_required = true;
        self
    }

    /// Whether this entry covers a normalized `path` for `kind`.
    #[must_use]
    pub fn covers(&self, workspace_root: &Path, path: &str, kind: AccessKind) -> bool {
        if !self.kinds.contains(&kind) {
            return false;
        }
        let base = normalize_path(workspace_root, Path::new(&self.base_path));
        if base == "." {
            return !path.starts_with('/');
        }
        path == base
            || path
                .strip_prefix(base.as_str())
                .is_some_and(|rest| rest.starts_with('/') || base.ends_with('/'))
    }
}

/// Permission to run one executable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutablePermission {
    /// Working directory the tool runs the command in.
    #[serde(default)]
    pub workdir: String,
    /// Executable name or path.
    pub command: String,
    /// Command-mode glob patterns each argument must match. Empty allows any.
    #[serde(default)]
    pub allowed_args: Vec<String>,
    /// Force approval for every invocation.
    #[serde(default)]
    pub hitl_required: bool,
    /// `allowed_args`, compiled when the entry is built or registered.
    #[serde(skip)]
    arg_patterns: Option<PatternSet>,
}

impl ExecutablePermission {
    /// Declare permission to run `command` with any arguments.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            workdir: String::new(),
            command: command.into(),
            allowed_args: Vec::new(),
            hitl_required: false,
            arg_patterns: None,
        }
    }

    /// Restrict arguments to the given patterns.
    ///
    /// Patterns that fail to compile are reported by
    /// [`ToolPermissionSet::validate`] and never match.
    #[must_use]
    pub fn with_args<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_args = patterns.into_iter().map(Into::into).collect();
        self.arg_patterns = self.compile_args().ok();
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn in_workdir(mut self, workdir: impl Into<String>) -> Self {
        self.workdir = workdir.into();
        self
    }

    /// Require approval for every invocation.
    #[must_use]
    pub fn with_hitl(mut self) -> Self {
        self.hitl_required = true;
        self
    }

    fn compile_args(&self) -> Result<PatternSet, PatternError> {
        PatternSet::new(MatchMode::Command, self.allowed_args.iter().cloned())
    }

    /// Whether this entry covers `command` invoked with `args`.
    ///
    /// A bare declaration (`git`) matches only the same bare name. A
    /// path-qualified one (`/usr/bin/git`) matches itself or its bare file
    /// name, never another path ending in that name.
    #[must_use]
    pub fn covers<S: AsRef<str>>(&self, command: &str, args: &[S]) -> bool {
        if !same_command(&self.command, command) {
            return false;
        }
        if self.allowed_args.is_empty() {
            return true;
        }
        let compiled;
        let patterns = match &self.arg_patterns {
            Some(patterns) => patterns,
            None => match self.compile_args() {
                Ok(patterns) => {
                    compiled = patterns;
                    &compiled
                },
                Err(_) => return false,
            },
        };
        args.iter().all(|arg| patterns.matches(arg.as_ref()))
    }
}

impl PartialEq for ExecutablePermission {
    fn eq(&self, other: &Self) -> bool {
        self.workdir == other.workdir
            && self.command == other.command
            && self.allowed_args == other.allowed_args
            && self.hitl_required == other.hitl_required
    }
}

impl Eq for ExecutablePermission {}

fn same_command(declared: &str, requested: &str) -> bool {
    if declared == requested {
        return true;
    }
    if !declared.contains('/') || requested.contains('/') {
        return false;
    }
    Path::new(declared)
        .file_name()
        .is_some_and(|name| name == requested)
}

/// The full permission declaration of one tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPermissionSet {
    /// File-system entries.
    #[serde(default)]
    pub file_system: Vec<FileSystemPermission>,
    /// Executable entries.
    #[serde(default)]
    pub executables: Vec<ExecutablePermission>,
}

impl ToolPermissionSet {
    /// An empty set. Invalid until at least one entry is added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a file-system entry.
    #[must_use]
    pub fn with_file(mut self, permission: FileSystemPermission) -> Self {
        self.file_system.push(permission);
        self
    }

    /// Add an executable entry.
    #[must_use]
    pub fn with_executable(mut self, permission: ExecutablePermission) -> Self {
        self.executables.push(permission);
        self
    }

    /// Check the declaration is well formed.
    ///
    /// # Errors
    ///
    /// - [`DeclarationError::EmptyPermissionSet`] if nothing is declared.
    /// - [`DeclarationError::AmbiguousBasePath`] if an empty base path is
    ///   combined with write or execute access.
    /// - [`DeclarationError::NoAccessKinds`], [`DeclarationError::EmptyExecutable`]
    ///   or [`DeclarationError::InvalidArgPattern`] for malformed entries.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        if self.file_system.is_empty() && self.executables.is_empty() {
            return Err(DeclarationError::EmptyPermissionSet);
        }

        for (index, entry) in self.file_system.iter().enumerate() {
            if entry.kinds.is_empty() {
                return Err(DeclarationError::NoAccessKinds { index });
            }
            let base = entry.base_path.trim();
            if (base.is_empty() || base == ".")
                && let Some(kind) = entry
                    .kinds
                    .iter()
                    .copied()
                    .find(|k| matches!(k, AccessKind::Write | AccessKind::Execute))
            {
                return Err(DeclarationError::AmbiguousBasePath { index, kind });
            }
        }

        for (index, entry) in self.executables.iter().enumerate() {
            if entry.command.trim().is_empty() {
                return Err(DeclarationError::EmptyExecutable { index });
            }
            for pattern in &entry.allowed_args {
                if crate::pattern::compile_glob(pattern, MatchMode::Command).is_err() {
                    return Err(DeclarationError::InvalidArgPattern {
                        index,
                        pattern: pattern.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// The first file-system entry covering `path` for `kind`.
    #[must_use]
    pub fn file_entry(
        &self,
        workspace_root: &Path,
        path: &str,
        kind: AccessKind,
    ) -> Option<&FileSystemPermission> {
        self.file_system
            .iter()
            .find(|entry| entry.covers(workspace_root, path, kind))
    }

    /// The first executable entry covering `command` with `args`.
    #[must_use]
    pub fn executable_entry<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
    ) -> Option<&ExecutablePermission> {
        self.executables
            .iter()
            .find(|entry| entry.covers(command, args))
    }
}

/// Implemented by every tool that performs side effects.
pub trait ToolPermissions: Send + Sync {
    /// Stable tool name used in call contexts.
    fn name(&self) -> &str;

    /// The minimum permissions the tool needs.
    fn permissions(&self) -> ToolPermissionSet;
}

/// Validated tool declarations, keyed by tool name.
#[derive(Debug, Default, Clone)]
pub struct DeclarationRegistry {
    tools: HashMap<String, ToolPermissionSet>,
}

impl DeclarationRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and register a tool.
    ///
    /// A tool whose declaration fails validation is excluded and logged.
    /// Re-registering a name replaces the previous declaration.
    ///
    /// # Errors
    ///
    /// Returns the validation failure so callers can report it.
    pub fn register(&mut self, tool: &dyn ToolPermissions) -> Result<(), DeclarationError> {
        self.register_set(tool.name(), tool.permissions())
    }

    /// Validate and register a declaration under `name`.
    ///
    /// # Errors
    ///
    /// Returns the validation failure; the name is left unregistered.
    pub fn register_set(
        &mut self,
        name: &str,
        mut set: ToolPermissionSet,
    ) -> Result<(), DeclarationError> {
        if let Err(e) = set.validate() {
            tracing::warn!(tool = name, error = %e, "excluding tool with invalid permission declaration");
            self.tools.remove(name);
            return Err(e);
        }
        for entry in &mut set.executables {
            if entry.arg_patterns.is_none() && !entry.allowed_args.is_empty() {
                entry.arg_patterns = entry.compile_args().ok();
            }
        }
        tracing::debug!(
            tool = name,
            file_entries = set.file_system.len(),
            executables = set.executables.len(),
            "registered tool permissions"
        );
        self.tools.insert(name.to_owned(), set);
        Ok(())
    }

    /// Register many tools, returning the ones that were excluded.
    pub fn register_all<'a, I>(&mut self, tools: I) -> Vec<(String, DeclarationError)>
    where
        I: IntoIterator<Item = &'a dyn ToolPermissions>,
    {
        tools
            .into_iter()
            .filter_map(|tool| {
                self.register(tool)
                    .err()
                    .map(|e| (tool.name().to_owned(), e))
            })
            .collect()
    }

    /// The declaration of a registered tool.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolPermissionSet> {
        self.tools.get(name)
    }

    /// Whether `name` is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
#[path = "declaration_tests.rs"]
mod tests;
