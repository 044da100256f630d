// src/memory/store.rs
use super::record::PatchRecord;
use crate::apply::writer::write_atomic;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const FORMAT_VERSION: u32 = 1;

#[derive(Serialize, Deserialize)]
struct StoreFile {
    version: u32,
    records: Vec<PatchRecord>,
}

/// Exclusive advisory lock, released on drop.
struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// On-disk index. Holds the lock for as long as the cache is open.
pub(super) struct Store {
    path: PathBuf,
    _lock: StoreLock,
}

impl Store {
    /// Locks and loads the index. The error string says why the cache has to
    /// run degraded.
    pub(super) fn open(path: &Path) -> Result<(Self, Vec<PatchRecord>), String> {
        let lock = acquire_lock(path).map_err(|e| format!("{e:#}"))?;
        let records = load(path).map_err(|e| format!("{e:#}"))?;
        Ok((
            Self {
                path: path.to_path_buf(),
                _lock: lock,
            },
            records,
        ))
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) fn save(&self, records: &[PatchRecord]) -> Result<()> {
        let file = StoreFile {
            version: FORMAT_VERSION,
            records: records.to_vec(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomic(&self.path, &json)
            .with_context(|| format!("Failed to write {}", self.path.display()))
    }
}

fn acquire_lock(path: &Path) -> Result<StoreLock> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let lock_path = path.with_extension("lock");
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open {}", lock_path.display()))?;

    match FileExt::try_lock_exclusive(&file) {
        Ok(()) => Ok(StoreLock { file }),
        Err(e) if e.kind() == ErrorKind::WouldBlock => {
            anyhow::bail!("{} is locked by another process", path.display())
        }
        Err(e) => Err(e).with_context(|| format!("Failed to lock {}", lock_path.display())),
    }
}

fn load(path: &Path) -> Result<Vec<PatchRecord>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    let file: StoreFile = serde_json::from_slice(&bytes)
        .with_context(|| format!("{} is corrupt", path.display()))?;
    if file.version != FORMAT_VERSION {
        anyhow::bail!(
            "{} has unsupported format version {}",
            path.display(),
            file.version
        );
    }
    Ok(file.records)
}
