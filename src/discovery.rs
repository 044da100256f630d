// src/discovery.rs
use crate::config::{Config, PRUNE_DIRS};
use anyhow::Result;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Enumerates candidate source files under `config.root`, sorted by path.
///
/// # Errors
/// Returns error if an exclude pattern does not compile.
pub fn discover(config: &Config) -> Result<Vec<PathBuf>> {
    let excludes = config.exclude_regexes()?;
    let raw_files = walk_filesystem(&config.root, config.verbose);
    let mut files: Vec<PathBuf> = raw_files
        .into_iter()
        .filter(|p| has_included_extension(p, &config.pipeline.include_extensions))
        .filter(|p| !is_excluded(&config.root, p, &excludes))
        .collect();
    files.sort();
    Ok(files)
}

fn should_prune(name: &str) -> bool {
    PRUNE_DIRS.contains(&name)
}

fn walk_filesystem(root: &Path, verbose: bool) -> Vec<PathBuf> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !should_prune(&e.file_name().to_string_lossy()));

    let (paths, error_count) = accumulate_walker(walker);
    if error_count > 0 && verbose {
        eprintln!("WARN: Encountered {error_count} errors during file walk");
    }
    paths
}

fn accumulate_walker<I>(walker: I) -> (Vec<PathBuf>, usize)
where
    I: Iterator<Item = walkdir::Result<walkdir::DirEntry>>,
{
    let mut paths = Vec::new();
    let mut errors = 0;
    for item in walker {
        match item {
            Ok(entry) if entry.file_type().is_file() => paths.push(entry.into_path()),
            Ok(_) => {}
            Err(_) => errors += 1,
        }
    }
    (paths, errors)
}

fn has_included_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| extensions.iter().any(|want| want.eq_ignore_ascii_case(ext)))
}

/// Normalizes a path to use forward slashes (cross-platform pattern matching).
fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn is_excluded(root: &Path, path: &Path, excludes: &[Regex]) -> bool {
    let relative = normalize_path(path.strip_prefix(root).unwrap_or(path));
    excludes.iter().any(|re| re.is_match(&relative))
}
