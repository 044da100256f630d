// src/apply/backup.rs
//! Durable pre-apply backups.
//!
//! Layout: `.forgefix/backups/<run-id>/<relative path>` holds the original
//! bytes and `<relative path>.json` its manifest ([`BackupHandle`]). Backups
//! survive a crash, so `forgefix rollback --run <id>` can restore them later.

use super::writer::write_atomic;
use crate::error::ApplyError;
use crate::patch::compute_sha256;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

pub const BACKUP_DIR: &str = ".forgefix/backups";
const MANIFEST_EXT: &str = "json";

/// Everything needed to restore one file, persisted next to the backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHandle {
    pub run_id: String,
    pub original_path: PathBuf,
    pub backup_path: PathBuf,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    workspace: PathBuf,
    run_id: String,
}

impl BackupStore {
    #[must_use]
    pub fn new(workspace: &Path, run_id: impl Into<String>) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            run_id: run_id.into(),
        }
    }

    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        run_dir(&self.workspace, &self.run_id)
    }

    /// Persists `content` as the backup of `path`.
    ///
    /// # Errors
    /// Returns error if the backup or its manifest cannot be written.
    pub fn store(&self, path: &Path, content: &str) -> Result<BackupHandle, ApplyError> {
        let backup_path = self.run_dir().join(self.relative_key(path));
        write_atomic(&backup_path, content.as_bytes())
            .map_err(|e| ApplyError::io(e, &backup_path))?;

        let handle = BackupHandle {
            run_id: self.run_id.clone(),
            original_path: path.to_path_buf(),
            backup_path: backup_path.clone(),
            sha256: compute_sha256(content),
            created_at: Utc::now(),
        };

        let manifest = manifest_path(&backup_path);
        let json = serde_json::to_vec_pretty(&handle)
            .map_err(|e| ApplyError::io(io::Error::new(io::ErrorKind::InvalidData, e), &manifest))?;
        write_atomic(&manifest, &json).map_err(|e| ApplyError::io(e, &manifest))?;
        Ok(handle)
    }

    /// Writes the backed-up content back to the original path.
    ///
    /// # Errors
    /// Returns error if the backup is unreadable, its hash no longer matches
    /// the manifest, or the original path cannot be written.
    pub fn restore(&self, handle: &BackupHandle) -> Result<(), ApplyError> {
        restore(handle)
    }

    /// Removes a backup and its manifest. Missing files are not an error.
    ///
    /// # Errors
    /// Returns error if an existing file cannot be removed.
    pub fn discard(&self, handle: &BackupHandle) -> Result<(), ApplyError> {
        for path in [handle.backup_path.clone(), manifest_path(&handle.backup_path)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(ApplyError::io(e, path)),
            }
        }
        remove_empty_parents(&handle.backup_path, &self.run_dir());
        Ok(())
    }

    /// Path inside the run directory that mirrors `path`.
    fn relative_key(&self, path: &Path) -> PathBuf {
        let relative = path.strip_prefix(&self.workspace).unwrap_or(path);
        relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .collect()
    }
}

fn run_dir(workspace: &Path, run_id: &str) -> PathBuf {
    workspace.join(BACKUP_DIR).join(run_id)
}

fn manifest_path(backup_path: &Path) -> PathBuf {
    let mut name = backup_path.as_os_str().to_owned();
    name.push(".");
    name.push(MANIFEST_EXT);
    PathBuf::from(name)
}

fn restore(handle: &BackupHandle) -> Result<(), ApplyError> {
    let content = fs::read_to_string(&handle.backup_path)
        .map_err(|e| ApplyError::io(e, &handle.backup_path))?;
    if compute_sha256(&content) != handle.sha256 {
        let err = io::Error::new(io::ErrorKind::InvalidData, "backup hash mismatch");
        return Err(ApplyError::io(err, &handle.backup_path));
    }
    write_atomic(&handle.original_path, content.as_bytes())
        .map_err(|e| ApplyError::io(e, &handle.original_path))
}

fn remove_empty_parents(from: &Path, stop_at: &Path) {
    let mut dir = from.parent();
    while let Some(d) = dir {
        if !d.starts_with(stop_at) || fs::remove_dir(d).is_err() {
            break;
        }
        dir = d.parent();
    }
}

/// All manifests recorded for `run_id`, sorted by original path.
///
/// # Errors
/// Returns error if the run directory does not exist.
pub fn list(workspace: &Path, run_id: &str) -> Result<Vec<BackupHandle>> {
    let dir = run_dir(workspace, run_id);
    if !dir.is_dir() {
        anyhow::bail!("No backups found for run {run_id} ({})", dir.display());
    }

    let mut handles: Vec<BackupHandle> = WalkDir::new(&dir)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| e.path().extension().is_some_and(|x| x == MANIFEST_EXT))
        .filter_map(|e| fs::read(e.path()).ok())
        .filter_map(|bytes| serde_json::from_slice::<BackupHandle>(&bytes).ok())
        .filter(|h| h.run_id == run_id)
        .collect();
    handles.sort_by(|a, b| a.original_path.cmp(&b.original_path));
    Ok(handles)
}

/// Restores every backup of a run. Returns the restored paths.
///
/// # Errors
/// Returns error on the first backup that cannot be restored.
pub fn restore_run(workspace: &Path, run_id: &str) -> Result<Vec<PathBuf>> {
    let mut restored = Vec::new();
    for handle in list(workspace, run_id)? {
        restore(&handle)
            .with_context(|| format!("Failed to restore {}", handle.original_path.display()))?;
        restored.push(handle.original_path);
    }
    Ok(restored)
}

/// Run ids with a backup directory, newest first.
#[must_use]
pub fn runs(workspace: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(workspace.join(BACKUP_DIR)) else {
        return Vec::new();
    };
    let mut ids: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_dir())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    // Run ids start with a sortable timestamp.
    ids.sort_by(|a, b| b.cmp(a));
    ids
}

/// Deletes all but the newest `retention` run directories. Returns how many
/// were removed.
pub fn prune(workspace: &Path, retention: usize) -> usize {
    runs(workspace)
        .into_iter()
        .skip(retention)
        .filter(|id| fs::remove_dir_all(run_dir(workspace, id)).is_ok())
        .count()
}
