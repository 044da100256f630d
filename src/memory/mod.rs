// src/memory/mod.rs
//! Similarity-indexed memory of accepted fixes.
//!
//! Records map an issue fingerprint and embedding to the patch that fixed it.
//! A lookup returns the nearest record of the same issue kind above a cosine
//! threshold. The cache never fails a caller: when the backing store is
//! unavailable it runs degraded and every lookup misses.

mod embedding;
mod record;
mod similarity;
mod store;

pub use embedding::{Embedder, HashingEmbedder, DEFAULT_DIMENSIONS};
pub use record::PatchRecord;
pub use similarity::cosine;

use crate::error::CacheUnavailable;
use crate::types::Fingerprint;
use chrono::{Duration, Utc};
use std::path::Path;
use std::sync::{PoisonError, RwLock};
use store::Store;

pub const DEFAULT_THRESHOLD: f32 = 0.92;
pub const DEFAULT_CAPACITY: usize = 512;
pub const MEMORY_FILE: &str = ".forgefix/memory.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySettings {
    pub capacity: usize,
    /// Records older than this are dropped at load and never returned.
    pub max_age: Option<Duration>,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            max_age: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStats {
    pub records: usize,
    pub capacity: usize,
    pub degraded: Option<String>,
}

pub struct MemoryCache {
    records: RwLock<Vec<PatchRecord>>,
    settings: MemorySettings,
    store: Option<Store>,
    unavailable: Option<String>,
}

impl MemoryCache {
    /// A cache with no backing file.
    #[must_use]
    pub fn in_memory(settings: MemorySettings) -> Self {
        Self::build(settings, None, Vec::new(), None)
    }

    /// A cache whose index is unreachable: lookups miss, nothing persists.
    #[must_use]
    pub fn degraded(settings: MemorySettings, reason: impl Into<String>) -> Self {
        Self::build(settings, None, Vec::new(), Some(reason.into()))
    }

    /// Loads the index at `path`. A missing file starts empty; a corrupt or
    /// locked one yields a degraded cache.
    #[must_use]
    pub fn open(path: &Path, settings: MemorySettings) -> Self {
        match Store::open(path) {
            Ok((store, mut records)) => {
                if let Some(max_age) = settings.max_age {
                    let cutoff = Utc::now() - max_age;
                    records.retain(|r| r.accepted_at >= cutoff);
                }
                let cache = Self::build(settings, Some(store), records, None);
                cache.enforce_capacity();
                cache
            }
            Err(reason) => Self::degraded(settings, reason),
        }
    }

    fn build(
        settings: MemorySettings,
        store: Option<Store>,
        records: Vec<PatchRecord>,
        unavailable: Option<String>,
    ) -> Self {
        Self {
            records: RwLock::new(records),
            settings,
            store,
            unavailable,
        }
    }

    /// Nearest same-kind record with cosine similarity at least `threshold`.
    /// Any failure is a miss.
    #[must_use]
    pub fn lookup(
        &self,
        fingerprint: &Fingerprint,
        embedding: &[f32],
        threshold: f32,
    ) -> Option<PatchRecord> {
        self.try_lookup(fingerprint, embedding, threshold)
            .ok()
            .flatten()
    }

    /// Like [`lookup`](Self::lookup) but reports why the index could not be consulted.
    ///
    /// # Errors
    /// Returns [`CacheUnavailable`] when running degraded.
    pub fn try_lookup(
        &self,
        fingerprint: &Fingerprint,
        embedding: &[f32],
        threshold: f32,
    ) -> Result<Option<PatchRecord>, CacheUnavailable> {
        self.check_available()?;
        let kind = fingerprint.kind();
        let cutoff = self.settings.max_age.map(|age| Utc::now() - age);

        let records = self.records.read().map_err(poisoned)?;
        let best = similarity::best_match(&records, kind, embedding, threshold, cutoff);
        Ok(best.and_then(|idx| records.get(idx).cloned()))
    }

    /// Appends a record, evicting the least recently accepted ones above
    /// capacity. A degraded cache keeps the record in memory only.
    ///
    /// # Errors
    /// Returns [`CacheUnavailable`] if the index lock is poisoned.
    pub fn insert(&self, record: PatchRecord) -> Result<(), CacheUnavailable> {
        self.records.write().map_err(poisoned)?.push(record);
        self.enforce_capacity();
        Ok(())
    }

    /// Writes the index back to disk. A cache without a store has nothing to do.
    ///
    /// # Errors
    /// Returns [`CacheUnavailable`] when degraded or when the write fails.
    pub fn flush(&self) -> Result<(), CacheUnavailable> {
        self.check_available()?;
        let Some(store) = &self.store else {
            return Ok(());
        };
        let records = self.records.read().map_err(poisoned)?;
        store.save(&records).map_err(|e| CacheUnavailable {
            reason: format!("failed to write {}: {e}", store.path().display()),
        })
    }

    /// Drops every record and persists the empty index.
    ///
    /// # Errors
    /// Same as [`flush`](Self::flush).
    pub fn clear(&self) -> Result<(), CacheUnavailable> {
        self.records.write().map_err(poisoned)?.clear();
        self.flush()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().map_or(0, |r| r.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.unavailable.is_some()
    }

    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        MemoryStats {
            records: self.len(),
            capacity: self.settings.capacity,
            degraded: self.unavailable.clone(),
        }
    }

    fn check_available(&self) -> Result<(), CacheUnavailable> {
        match &self.unavailable {
            Some(reason) => Err(CacheUnavailable {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn enforce_capacity(&self) {
        let Ok(mut records) = self.records.write() else {
            return;
        };
        let capacity = self.settings.capacity.max(1);
        while records.len() > capacity {
            let oldest = records
                .iter()
                .enumerate()
                .min_by_key(|(_, r)| r.accepted_at)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    records.remove(i);
                }
                None => break,
            }
        }
    }
}

fn poisoned<T>(_: PoisonError<T>) -> CacheUnavailable {
    CacheUnavailable {
        reason: "memory index lock poisoned".to_string(),
    }
}
