// src/config/mod.rs
pub mod io;
pub mod types;

pub use self::io::CONFIG_FILE;
pub use self::types::{
    Config, ForgefixToml, LimitsConfig, MemoryConfig, PipelineConfig, Preferences,
    PublishConfig, RetryConfig, RuleConfig, ServiceConfig,
};

use crate::collab::llm::ServiceSettings;
use crate::limiter::{LimiterSettings, RetryPolicy};
use crate::memory::MemorySettings;
use anyhow::{bail, Result};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directories never descended into during discovery.
pub const PRUNE_DIRS: &[&str] = &[
    ".git",
    ".forgefix",
    "node_modules",
    "dist",
    "build",
    "target",
    ".venv",
    "venv",
    ".tox",
    ".cache",
    "coverage",
    "vendor",
    "third_party",
];

impl Config {
    /// Loads `forgefix.toml` from `root`, then the process environment.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or an override is malformed.
    pub fn load(root: &Path) -> Result<Self> {
        Self::load_with(root, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::load`] with an injectable environment.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or an override is malformed.
    pub fn load_with<F>(root: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self {
            root: root.to_path_buf(),
            ..Self::default()
        };
        io::merge_toml(&mut config, io::load_toml(root)?);
        io::apply_env(&mut config, env)?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    ///
    /// # Errors
    /// Returns the first invalid setting found.
    pub fn validate(&self) -> Result<()> {
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        if self.limits.rate_limit_per_minute == 0 {
            bail!("limits.rate_limit_per_minute must be at least 1");
        }
        if self.limits.publish_rate_limit_per_minute == Some(0) {
            bail!("limits.publish_rate_limit_per_minute must be at least 1");
        }
        if self.limits.call_timeout_secs == 0 {
            bail!("limits.call_timeout_secs must be at least 1");
        }
        if self.retry.max_attempts == 0 {
            bail!("retry.max_attempts must be at least 1");
        }
        if self.retry.multiplier < 1.0 {
            bail!("retry.multiplier must be >= 1.0");
        }
        let threshold = self.memory.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            bail!("memory.similarity_threshold must be within [0, 1], got {threshold}");
        }
        if self.memory.capacity == 0 {
            bail!("memory.capacity must be at least 1");
        }
        self.exclude_regexes()?;
        Ok(())
    }

    /// # Errors
    /// Returns error naming the first pattern that does not compile.
    pub fn exclude_regexes(&self) -> Result<Vec<Regex>> {
        self.pipeline
            .exclude_patterns
            .iter()
            .map(|p| Regex::new(p).map_err(|e| anyhow::anyhow!("bad exclude pattern '{p}': {e}")))
            .collect()
    }

    /// Lists credentials `run` needs but does not have.
    #[must_use]
    pub fn missing_credentials(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.api_key.is_none() {
            missing.push("API_KEY");
        }
        missing
    }

    #[must_use]
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.limits.call_timeout_secs)
    }

    #[must_use]
    pub fn limiter_settings(&self) -> LimiterSettings {
        let fix = self.limits.rate_limit_per_minute;
        LimiterSettings {
            fix_generation_per_minute: fix,
            publishing_per_minute: self.limits.publish_rate_limit_per_minute.unwrap_or(fix),
            max_wait: Duration::from_secs(self.limits.max_wait_secs),
        }
    }

    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            multiplier: self.retry.multiplier,
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }

    #[must_use]
    pub fn memory_settings(&self) -> MemorySettings {
        MemorySettings {
            capacity: self.memory.capacity,
            max_age: self
                .memory
                .max_age_days
                .map(|d| chrono::Duration::days(i64::from(d))),
        }
    }

    #[must_use]
    pub fn memory_path(&self) -> PathBuf {
        self.root.join(&self.memory.path)
    }

    /// Returns `None` when no fix-generation credential is configured.
    #[must_use]
    pub fn service_settings(&self) -> Option<ServiceSettings> {
        Some(ServiceSettings {
            endpoint: self.service.endpoint.clone(),
            model: self.service.model.clone(),
            max_tokens: self.service.max_tokens,
            api_key: self.api_key.clone()?,
            timeout: self.call_timeout(),
        })
    }
}
