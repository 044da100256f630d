// tests/unit_config.rs
use forgefix_core::config::{Config, RuleConfig};
use std::collections::HashMap;
use std::fs;
use std::time::Duration;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_defaults() {
    let d = tempfile::tempdir().unwrap();
    let c = Config::load_with(d.path(), env(&[])).unwrap();
    assert_eq!(c.pipeline.max_files, 10);
    assert_eq!(c.pipeline.workers, 4);
    assert_eq!(c.limits.rate_limit_per_minute, 30);
    assert!((c.memory.similarity_threshold - 0.92).abs() < f32::EPSILON);
    assert_eq!(c.memory.capacity, 512);
    assert_eq!(c.preferences.backup_retention, 5);
    assert!(c.api_key.is_none());
    assert_eq!(c.missing_credentials(), vec!["API_KEY"]);

    let r = RuleConfig::default();
    assert_eq!(r.max_cyclomatic_complexity, 10);
    assert_eq!(r.max_nesting_depth, 3);
    assert_eq!(r.max_function_args, 5);
}

#[test]
fn test_load_toml() {
    let d = tempfile::tempdir().unwrap();
    fs::write(
        d.path().join("forgefix.toml"),
        "[pipeline]\nworkers = 2\n\n[memory]\nsimilarity_threshold = 0.8\nmax_age_days = 30\n\n[limits]\npublish_rate_limit_per_minute = 6\n",
    )
    .unwrap();
    let c = Config::load_with(d.path(), env(&[])).unwrap();
    assert_eq!(c.pipeline.workers, 2);
    assert_eq!(c.pipeline.max_files, 10);
    assert_eq!(c.memory.max_age_days, Some(30));

    let limits = c.limiter_settings();
    assert_eq!(limits.fix_generation_per_minute, 30);
    assert_eq!(limits.publishing_per_minute, 6);
    assert!(c.memory_settings().max_age.is_some());
}

#[test]
fn test_env_overrides_file() {
    let d = tempfile::tempdir().unwrap();
    fs::write(d.path().join("forgefix.toml"), "[pipeline]\nmax_files = 50\n").unwrap();
    let c = Config::load_with(
        d.path(),
        env(&[
            ("MAX_FILES", "3"),
            ("RATE_LIMIT_PER_MINUTE", "12"),
            ("API_KEY", "sk-test"),
            ("VCS_TOKEN", ""),
        ]),
    )
    .unwrap();
    assert_eq!(c.pipeline.max_files, 3);
    assert_eq!(c.limits.rate_limit_per_minute, 12);
    assert_eq!(c.api_key.as_deref(), Some("sk-test"));
    assert!(c.vcs_token.is_none());

    let service = c.service_settings().unwrap();
    assert_eq!(service.api_key, "sk-test");
    assert_eq!(service.timeout, Duration::from_secs(60));
}

#[test]
fn test_bad_env_value() {
    let d = tempfile::tempdir().unwrap();
    let err = Config::load_with(d.path(), env(&[("MAX_FILES", "many")])).unwrap_err();
    assert!(format!("{err:#}").contains("MAX_FILES"));
}

#[test]
fn test_bad_toml() {
    let d = tempfile::tempdir().unwrap();
    fs::write(d.path().join("forgefix.toml"), "[pipeline\nworkers = ").unwrap();
    assert!(Config::load_with(d.path(), env(&[])).is_err());
}

#[test]
fn test_validate() {
    let d = tempfile::tempdir().unwrap();
    let mut c = Config::load_with(d.path(), env(&[])).unwrap();
    assert!(c.validate().is_ok());

    c.pipeline.workers = 0;
    assert!(c.validate().is_err());
    c.pipeline.workers = 1;

    c.memory.similarity_threshold = 1.5;
    assert!(c.validate().is_err());
    c.memory.similarity_threshold = 0.5;

    c.pipeline.exclude_patterns = vec!["(".to_string()];
    assert!(c.validate().is_err());
}
