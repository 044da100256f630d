// src/apply/mod.rs
//! Patch application engine.
//!
//! [`apply`] is pure: it checks every hunk against the content, splices the
//! new text, and runs the structure check. [`FileApplier`] adds the disk side:
//! a durable backup first, then an atomic replace.

pub mod backup;
pub mod engine;
pub mod validator;
pub mod writer;

pub use backup::{BackupHandle, BackupStore};
pub use engine::{apply, splice, AppliedResult};
pub use validator::{NoCheck, StructureCheck, SyntaxCheck};

use crate::error::{ApplyError, ConflictError};
use crate::patch::Patch;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Applies patches to files on disk with backup and rollback.
pub struct FileApplier {
    backups: BackupStore,
    check: Arc<dyn StructureCheck>,
}

impl FileApplier {
    #[must_use]
    pub fn new(backups: BackupStore, check: Arc<dyn StructureCheck>) -> Self {
        Self { backups, check }
    }

    #[must_use]
    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    /// Validates the patch against `original` without touching the disk.
    ///
    /// # Errors
    /// Same conflicts and validation failures as [`apply`].
    pub fn preview(
        &self,
        path: &Path,
        patch: &Patch,
        original: &str,
    ) -> Result<AppliedResult, ApplyError> {
        apply(patch, original, path, self.check.as_ref())
    }

    /// Applies `patch` to the file at `path`.
    ///
    /// `expected_original` is the snapshot the patch was drafted against; if
    /// the file no longer holds exactly that, nothing is written. The backup
    /// is persisted before the new content is committed, and if the commit
    /// fails the backup is restored.
    ///
    /// # Errors
    /// Returns [`ApplyError`] on conflict, failed structure check, or I/O
    /// failure. In every error case the file holds its original content.
    pub fn apply_file(
        &self,
        path: &Path,
        patch: &Patch,
        expected_original: &str,
    ) -> Result<(AppliedResult, BackupHandle), ApplyError> {
        let current = fs::read_to_string(path).map_err(|e| ApplyError::io(e, path))?;
        if current != expected_original {
            return Err(ConflictError::FileChanged.into());
        }

        let result = apply(patch, &current, path, self.check.as_ref())?;
        let handle = self.backups.store(path, &current)?;

        if let Err(e) = writer::write_atomic(path, result.content.as_bytes()) {
            let _ = self.backups.restore(&handle);
            return Err(ApplyError::io(e, path));
        }
        Ok((result, handle))
    }

    /// Restores the pre-apply content recorded in `handle`.
    ///
    /// # Errors
    /// Returns error if the backup is missing, corrupt, or cannot be written back.
    pub fn rollback(&self, handle: &BackupHandle) -> Result<(), ApplyError> {
        self.backups.restore(handle)
    }

    /// Drops a backup once its change is accepted.
    ///
    /// # Errors
    /// Returns error if the backup files cannot be removed.
    pub fn discard(&self, handle: &BackupHandle) -> Result<(), ApplyError> {
        self.backups.discard(handle)
    }
}
