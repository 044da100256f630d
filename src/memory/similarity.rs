// src/memory/similarity.rs
use super::record::PatchRecord;
use crate::types::IssueKind;
use chrono::{DateTime, Utc};
use rayon::prelude::*;

/// Cosine similarity. Mismatched dimensions or a zero vector score 0.
#[must_use]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation)]
    let score = (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32;
    score.clamp(-1.0, 1.0)
}

/// Index of the best record: same kind, not older than `cutoff`, score at
/// least `threshold`. Ties go to the most recently accepted.
pub(super) fn best_match(
    records: &[PatchRecord],
    kind: Option<IssueKind>,
    embedding: &[f32],
    threshold: f32,
    cutoff: Option<DateTime<Utc>>,
) -> Option<usize> {
    let kind = kind?;
    records
        .par_iter()
        .enumerate()
        .filter(|(_, r)| r.fingerprint.kind() == Some(kind))
        .filter(|(_, r)| cutoff.map_or(true, |c| r.accepted_at >= c))
        .map(|(i, r)| (i, cosine(&r.embedding, embedding), r.accepted_at))
        .filter(|(_, score, _)| *score >= threshold)
        .max_by(|a, b| a.1.total_cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)))
        .map(|(i, _, _)| i)
}
