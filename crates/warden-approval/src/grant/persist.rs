//! Persistence backends for `Persistent` grants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use warden_core::{PermissionError, PermissionResult};

use super::Grant;

/// Storage for persistent grants.
///
/// The store always hands over the full persistent snapshot, so a backend
/// only needs whole-document load and save.
pub trait GrantPersistence: Send + Sync + fmt::Debug {
    /// Load all stored grants.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the backing store is unreadable.
    fn load(&self) -> PermissionResult<Vec<Grant>>;

    /// Replace the stored grants with `grants`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the snapshot cannot be written.
    fn save(&self, grants: &[Grant]) -> PermissionResult<()>;
}

/// Backend that keeps nothing. Persistent grants live for the process only.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoPersistence;

impl GrantPersistence for NoPersistence {
    fn load(&self) -> PermissionResult<Vec<Grant>> {
        Ok(Vec::new())
    }

    fn save(&self, _grants: &[Grant]) -> PermissionResult<()> {
        Ok(())
    }
}

const GRANT_FILE_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct GrantFile {
    version: u32,
    grants: Vec<Grant>,
}

/// Grants stored as one JSON document, replaced atomically on save.
#[derive(Debug, Clone)]
pub struct JsonGrantFile {
    path: PathBuf,
}

impl JsonGrantFile {
    /// Use the JSON document at `path`. The file is created on first save.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Location of the document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_else(|| "grants.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl GrantPersistence for JsonGrantFile {
    fn load(&self) -> PermissionResult<Vec<Grant>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let file: GrantFile = serde_json::from_str(&content).map_err(|e| {
            PermissionError::Storage(format!(
                "failed to parse grant file {}: {e}",
                self.path.display()
            ))
        })?;
        if file.version != GRANT_FILE_VERSION {
            return Err(PermissionError::Storage(format!(
                "unsupported grant file version {} in {}",
                file.version,
                self.path.display()
            )));
        }
        Ok(file.grants)
    }

    fn save(&self, grants: &[Grant]) -> PermissionResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let doc = GrantFile {
            version: GRANT_FILE_VERSION,
            grants: grants.to_vec(),
        };
        let json = serde_json::to_string_pretty(&doc)
            .map_err(|e| PermissionError::Storage(e.to_string()))?;
        let tmp = self.temp_path();
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_core::{AgentId, GrantScope};

    #[test]
    fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonGrantFile::new(dir.path().join("grants.json"));
        assert!(backend.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonGrantFile::new(dir.path().join("state").join("grants.json"));
        let grant = Grant::new(
            AgentId::from("coder"),
            "command.execute",
            "cargo test",
            GrantScope::Persistent,
        );
        backend.save(std::slice::from_ref(&grant)).unwrap();

        let loaded = backend.load().unwrap();
        assert_eq!(loaded, vec![grant]);
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_corrupt_file_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = JsonGrantFile::new(path).load().unwrap_err();
        assert!(matches!(err, PermissionError::Storage(_)));
    }

    #[test]
    fn test_unknown_version_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grants.json");
        std::fs::write(&path, r#"{"version": 99, "grants": []}"#).unwrap();
        assert!(JsonGrantFile::new(path).load().is_err());
    }
}
