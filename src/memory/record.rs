// src/memory/record.rs
use crate::types::Fingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An accepted fix. Created once, never mutated; the cache hands out copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchRecord {
    pub id: Uuid,
    pub fingerprint: Fingerprint,
    pub embedding: Vec<f32>,
    /// Unified-diff text of the accepted patch.
    pub patch: String,
    /// File the patch was accepted for.
    pub path: String,
    pub accepted_at: DateTime<Utc>,
}

impl PatchRecord {
    #[must_use]
    pub fn new(
        fingerprint: Fingerprint,
        embedding: Vec<f32>,
        patch: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            fingerprint,
            embedding,
            patch: patch.into(),
            path: path.into(),
            accepted_at: Utc::now(),
        }
    }

    /// Same record with an explicit acceptance time (imports, tests).
    #[must_use]
    pub fn with_accepted_at(mut self, at: DateTime<Utc>) -> Self {
        self.accepted_at = at;
        self
    }
}
