//! Resource normalization.
//!
//! Paths are resolved lexically (no filesystem access, symlinks are not
//! followed) and rendered workspace-relative with `/` separators. A path
//! that escapes the workspace keeps its absolute form so it can never match
//! a relative pattern by accident.

use std::path::{Component, Path, PathBuf};

/// Lexically resolve `.` and `..` components.
fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {},
            Component::ParentDir => {
                let popped = matches!(out.components().next_back(), Some(Component::Normal(_)))
                    && out.pop();
                if !popped && !out.has_root() {
                    out.push("..");
                }
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn join_slash(path: &Path) -> String {
    let mut rendered = String::new();
    for component in path.components() {
        match component {
            Component::RootDir => rendered.push('/'),
            Component::Prefix(prefix) => {
                rendered.push_str(&prefix.as_os_str().to_string_lossy());
            },
            Component::Normal(part) => {
                if !rendered.is_empty() && !rendered.ends_with('/') {
                    rendered.push('/');
                }
                rendered.push_str(&part.to_string_lossy());
            },
            Component::CurDir | Component::ParentDir => {
                if !rendered.is_empty() && !rendered.ends_with('/') {
                    rendered.push('/');
                }
                rendered.push_str(&component.as_os_str().to_string_lossy());
            },
        }
    }
    rendered
}

/// Normalize `path` against `workspace_root`.
///
/// Relative paths are taken relative to the root. The root itself renders
/// as `"."`.
#[must_use]
pub fn normalize_path(workspace_root: &Path, path: &Path) -> String {
    let root = clean(workspace_root);
    let absolute = if path.is_absolute() {
        clean(path)
    } else {
        clean(&root.join(path))
    };

    match absolute.strip_prefix(&root) {
        Ok(rel) if rel.as_os_str().is_empty() => ".".to_owned(),
        Ok(rel) => join_slash(rel),
        Err(_) => join_slash(&absolute),
    }
}

/// Join a command and its arguments into the string bash rules match against.
#[must_use]
pub fn command_line<S: AsRef<str>>(command: &str, args: &[S]) -> String {
    let mut line = command.trim().to_owned();
    for arg in args {
        line.push(' ');
        line.push_str(arg.as_ref());
    }
    line
}
