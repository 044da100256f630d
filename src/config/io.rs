// src/config/io.rs
use super::types::{Config, ForgefixToml};
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

pub const CONFIG_FILE: &str = "forgefix.toml";

/// Reads `forgefix.toml` under `root`. A missing file yields defaults.
///
/// # Errors
/// Returns error if the file exists but cannot be read or parsed.
pub fn load_toml(root: &Path) -> Result<ForgefixToml> {
    let path = root.join(CONFIG_FILE);
    if !path.exists() {
        return Ok(ForgefixToml::default());
    }
    let content =
        fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    parse_toml(&content).with_context(|| format!("Invalid {}", path.display()))
}

/// # Errors
/// Returns error on TOML syntax or type errors.
pub fn parse_toml(content: &str) -> Result<ForgefixToml> {
    Ok(toml::from_str(content)?)
}

pub fn merge_toml(config: &mut Config, parsed: ForgefixToml) {
    config.pipeline = parsed.pipeline;
    config.limits = parsed.limits;
    config.retry = parsed.retry;
    config.memory = parsed.memory;
    config.service = parsed.service;
    config.publish = parsed.publish;
    config.rules = parsed.rules;
    config.preferences = parsed.preferences;
}

/// Applies environment overrides through `lookup` so tests can inject values.
///
/// # Errors
/// Returns error if a numeric variable does not parse.
pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(key) = get("API_KEY") {
        config.api_key = Some(key);
    }
    if let Some(token) = get("VCS_TOKEN") {
        config.vcs_token = Some(token);
    }
    if let Some(raw) = get("MAX_FILES") {
        config.pipeline.max_files = raw
            .trim()
            .parse()
            .with_context(|| format!("MAX_FILES must be a non-negative integer, got '{raw}'"))?;
    }
    if let Some(raw) = get("RATE_LIMIT_PER_MINUTE") {
        config.limits.rate_limit_per_minute = raw.trim().parse().with_context(|| {
            format!("RATE_LIMIT_PER_MINUTE must be a positive integer, got '{raw}'")
        })?;
    }
    Ok(())
}
