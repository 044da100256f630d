// src/limiter/mod.rs
//! Outbound call budgeting.
//!
//! Every call to an external service first takes a token from the bucket of
//! its [`ServiceClass`]. Waiters of one class are served in arrival order and
//! give up after `max_wait`.

mod bucket;
pub mod retry;

pub use retry::{with_retry, RetryError, RetryPolicy, Retryable};

use crate::error::RateLimitExceeded;
use bucket::TokenBucket;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceClass {
    FixGeneration,
    Publishing,
}

impl ServiceClass {
    pub const ALL: [Self; 2] = [Self::FixGeneration, Self::Publishing];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixGeneration => "fix_generation",
            Self::Publishing => "publishing",
        }
    }
}

impl fmt::Display for ServiceClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimiterSettings {
    pub fix_generation_per_minute: u32,
    pub publishing_per_minute: u32,
    pub max_wait: Duration,
}

impl Default for LimiterSettings {
    fn default() -> Self {
        Self {
            fix_generation_per_minute: 30,
            publishing_per_minute: 30,
            max_wait: Duration::from_secs(120),
        }
    }
}

/// Process-wide token state, one bucket per service class.
pub struct RateLimiter {
    fix_generation: TokenBucket,
    publishing: TokenBucket,
    max_wait: Duration,
}

impl RateLimiter {
    #[must_use]
    pub fn new(settings: LimiterSettings) -> Self {
        Self {
            fix_generation: TokenBucket::per_minute(settings.fix_generation_per_minute),
            publishing: TokenBucket::per_minute(settings.publishing_per_minute),
            max_wait: settings.max_wait,
        }
    }

    /// Waits for a token of `class`.
    ///
    /// # Errors
    /// Returns [`RateLimitExceeded`] when no token frees up within `max_wait`.
    pub async fn acquire(&self, class: ServiceClass) -> Result<(), RateLimitExceeded> {
        let bucket = self.bucket(class);
        match tokio::time::timeout(self.max_wait, bucket.take()).await {
            Ok(()) => Ok(()),
            Err(_) => Err(RateLimitExceeded {
                class,
                waited: self.max_wait,
            }),
        }
    }

    /// Total tokens handed out for `class` since construction.
    #[must_use]
    pub fn granted(&self, class: ServiceClass) -> usize {
        self.bucket(class).granted()
    }

    #[must_use]
    pub fn capacity(&self, class: ServiceClass) -> usize {
        self.bucket(class).capacity()
    }

    fn bucket(&self, class: ServiceClass) -> &TokenBucket {
        match class {
            ServiceClass::FixGeneration => &self.fix_generation,
            ServiceClass::Publishing => &self.publishing,
        }
    }
}
