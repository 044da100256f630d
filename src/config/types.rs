// src/config/types.rs
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default = "default_max_files")]
    pub max_files: usize,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_extensions")]
    pub include_extensions: Vec<String>,
    /// Regexes matched against forward-slash relative paths.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files: default_max_files(),
            workers: default_workers(),
            dry_run: false,
            include_extensions: default_extensions(),
            exclude_patterns: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_rate")]
    pub rate_limit_per_minute: u32,
    /// Falls back to `rate_limit_per_minute` when unset.
    #[serde(default)]
    pub publish_rate_limit_per_minute: Option<u32>,
    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit_per_minute: default_rate(),
            publish_rate_limit_per_minute: None,
            max_wait_secs: default_max_wait(),
            call_timeout_secs: default_call_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_threshold")]
    pub similarity_threshold: f32,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default = "default_memory_path")]
    pub path: PathBuf,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            similarity_threshold: default_threshold(),
            capacity: default_capacity(),
            max_age_days: None,
            path: default_memory_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_base_branch")]
    pub base_branch: String,
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,
    #[serde(default = "default_remote")]
    pub remote: String,
    /// `owner/name`; derived from the remote URL when unset.
    #[serde(default)]
    pub github_repo: Option<String>,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_branch: default_base_branch(),
            branch_prefix: default_branch_prefix(),
            remote: default_remote(),
            github_repo: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    #[serde(default = "default_max_complexity")]
    pub max_cyclomatic_complexity: usize,
    #[serde(default = "default_max_depth")]
    pub max_nesting_depth: usize,
    #[serde(default = "default_max_args")]
    pub max_function_args: usize,
    #[serde(default = "default_max_words")]
    pub max_function_words: usize,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            max_cyclomatic_complexity: default_max_complexity(),
            max_nesting_depth: default_max_depth(),
            max_function_args: default_max_args(),
            max_function_words: default_max_words(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default = "default_backup_retention")]
    pub backup_retention: usize,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            backup_retention: default_backup_retention(),
        }
    }
}

const fn default_true() -> bool { true }
const fn default_max_files() -> usize { 10 }
const fn default_workers() -> usize { 4 }
const fn default_rate() -> u32 { 30 }
const fn default_max_wait() -> u64 { 120 }
const fn default_call_timeout() -> u64 { 60 }
const fn default_attempts() -> u32 { 3 }
const fn default_initial_backoff() -> u64 { 500 }
const fn default_multiplier() -> f64 { 2.0 }
const fn default_max_backoff() -> u64 { 8_000 }
const fn default_threshold() -> f32 { 0.92 }
const fn default_capacity() -> usize { 512 }
const fn default_max_tokens() -> u32 { 4096 }
const fn default_max_complexity() -> usize { 10 }
const fn default_max_depth() -> usize { 3 }
const fn default_max_args() -> usize { 5 }
const fn default_max_words() -> usize { 5 }
const fn default_backup_retention() -> usize { 5 }

fn default_extensions() -> Vec<String> {
    ["rs", "py", "ts", "tsx", "js", "jsx"].map(String::from).to_vec()
}
fn default_memory_path() -> PathBuf { PathBuf::from(crate::memory::MEMORY_FILE) }
fn default_endpoint() -> String { "https://api.groq.com/openai/v1/chat/completions".to_string() }
fn default_model() -> String { "llama-3.3-70b-versatile".to_string() }
fn default_base_branch() -> String { "main".to_string() }
fn default_branch_prefix() -> String { "forgefix/".to_string() }
fn default_remote() -> String { "origin".to_string() }

/// Shape of `forgefix.toml`. Every section and field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ForgefixToml {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub rules: RuleConfig,
    #[serde(default)]
    pub preferences: Preferences,
}

/// Effective configuration: file, then environment, then CLI flags.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub root: PathBuf,
    pub pipeline: PipelineConfig,
    pub limits: LimitsConfig,
    pub retry: RetryConfig,
    pub memory: MemoryConfig,
    pub service: ServiceConfig,
    pub publish: PublishConfig,
    pub rules: RuleConfig,
    pub preferences: Preferences,
    pub api_key: Option<String>,
    pub vcs_token: Option<String>,
    pub verbose: bool,
}
