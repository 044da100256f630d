// src/memory/embedding.rs
use crate::types::{normalize_description, Issue};
use sha2::{Digest, Sha256};

pub const DEFAULT_DIMENSIONS: usize = 256;

/// Turns an issue and the file it was found in into a vector for similarity search.
pub trait Embedder: Send + Sync {
    fn embed(&self, issue: &Issue, content: &str) -> Vec<f32>;
}

/// Feature-hashed bag of tokens and token bigrams over the issue kind, its
/// normalized description, and the offending source lines. L2-normalized.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashingEmbedder {
    #[must_use]
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn add_features(&self, vector: &mut [f32], text: &str, weight: f32) {
        let tokens = tokenize(text);
        for token in &tokens {
            self.add(vector, token, weight);
        }
        for pair in tokens.windows(2) {
            if let [a, b] = pair {
                self.add(vector, &format!("{a} {b}"), weight * 0.5);
            }
        }
    }

    fn add(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let hash = u64::from_le_bytes(bytes);

        let slot = usize::try_from(hash % self.dimensions as u64).unwrap_or(0);
        let sign = if hash >> 63 == 1 { -1.0 } else { 1.0 };
        if let Some(cell) = vector.get_mut(slot) {
            *cell += sign * weight;
        }
    }
}

impl Embedder for HashingEmbedder {
    fn embed(&self, issue: &Issue, content: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        self.add_features(&mut vector, issue.kind().as_str(), 2.0);
        self.add_features(&mut vector, &normalize_description(issue.description()), 1.0);

        let range = issue.location();
        let offending: Vec<&str> = content
            .lines()
            .skip(range.start.saturating_sub(1))
            .take(range.span())
            .collect();
        self.add_features(&mut vector, &offending.join("\n"), 0.5);

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
