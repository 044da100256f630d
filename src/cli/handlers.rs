// src/cli/handlers.rs
use super::args::RunArgs;
use crate::analysis::TreeSitterAnalyzer;
use crate::apply::{backup, SyntaxCheck};
use crate::collab::{
    git, github, Collaborators, GitHubClient, GitPublisher, GitSettings, HttpFixProposer,
    LocalPublisher, Publisher,
};
use crate::config::Config;
use crate::discovery;
use crate::error::RunError;
use crate::events::EventLogger;
use crate::exit::ForgefixExit;
use crate::limiter::RateLimiter;
use crate::memory::{HashingEmbedder, MemoryCache};
use crate::pipeline::{new_run_id, Orchestrator, PipelineSettings};
use crate::reporting;
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loads config for `path`, printing the problem and returning `None` if invalid.
fn load_config(path: &Path) -> Result<Option<Config>> {
    let root = canonical_root(path)?;
    let config = match Config::load(&root) {
        Ok(c) => c,
        Err(e) => {
            reporting::error(&format!("{e:#}"));
            return Ok(None);
        }
    };
    Ok(Some(config))
}

fn canonical_root(path: &Path) -> Result<PathBuf> {
    path.canonicalize()
        .with_context(|| format!("Cannot open {}", path.display()))
}

/// `forgefix run`.
///
/// # Errors
/// Returns error on discovery or setup failures outside the pipeline.
pub async fn handle_run(args: RunArgs) -> Result<ForgefixExit> {
    let Some(mut config) = load_config(&args.path)? else {
        return Ok(ForgefixExit::InvalidConfig);
    };
    apply_flags(&mut config, &args);
    if let Err(e) = config.validate() {
        reporting::error(&format!("{e:#}"));
        return Ok(ForgefixExit::InvalidConfig);
    }
    let Some(service) = config.service_settings() else {
        reporting::error("API_KEY is not set; fix generation needs a credential.");
        return Ok(ForgefixExit::InvalidConfig);
    };

    let run_id = new_run_id();
    let collaborators = Collaborators {
        analyzer: Arc::new(TreeSitterAnalyzer::new(config.rules.clone())),
        proposer: Arc::new(HttpFixProposer::new(service)?),
        publisher: build_publisher(&config, &run_id)?,
        checker: Arc::new(SyntaxCheck),
        embedder: Arc::new(HashingEmbedder::default()),
    };

    let memory = if config.memory.enabled {
        MemoryCache::open(&config.memory_path(), config.memory_settings())
    } else {
        MemoryCache::in_memory(config.memory_settings())
    };
    if let Some(reason) = memory.stats().degraded {
        reporting::warn(&format!("fix memory unavailable, continuing without it: {reason}"));
    }

    let candidates = discovery::discover(&config)?;
    let orchestrator = Orchestrator::new(
        &config.root,
        run_id.clone(),
        PipelineSettings::from_config(&config),
        collaborators,
    )
    .with_limiter(Arc::new(RateLimiter::new(config.limiter_settings())))
    .with_memory(Arc::new(memory))
    .with_events(EventLogger::new(&config.root, &run_id));

    let cancel = orchestrator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            reporting::warn("Interrupted: finishing in-flight work, dispatching nothing new.");
            cancel.cancel();
        }
    });

    if !args.json {
        println!(
            "{} run {} over {} candidate {}",
            "forgefix".bold(),
            run_id,
            candidates.len(),
            reporting::pluralize("file", candidates.len())
        );
    }

    let result = orchestrator.run(candidates).await;
    let removed = backup::prune(&config.root, config.preferences.backup_retention);
    if removed > 0 && config.verbose {
        reporting::ok(&format!("pruned {removed} old backup {}", reporting::pluralize("run", removed)));
    }

    match result {
        Ok(report) => {
            if args.json {
                reporting::print_json(&report)?;
            } else {
                reporting::print_report(&report);
            }
            Ok(report.exit_code())
        }
        Err(RunError::Fatal {
            class,
            error,
            report,
        }) => {
            if let Some(report) = report {
                if args.json {
                    reporting::print_json(&report)?;
                } else {
                    reporting::print_report(&report);
                }
            }
            reporting::error(&format!("{class} service rejected the run: {error}"));
            Ok(ForgefixExit::Fatal)
        }
    }
}

fn apply_flags(config: &mut Config, args: &RunArgs) {
    if let Some(n) = args.max_files {
        config.pipeline.max_files = n;
    }
    if let Some(n) = args.workers {
        config.pipeline.workers = n;
    }
    if args.dry_run {
        config.pipeline.dry_run = true;
    }
    if args.no_publish {
        config.publish.enabled = false;
    }
    config.verbose = args.verbose;
}

fn build_publisher(config: &Config, run_id: &str) -> Result<Arc<dyn Publisher>> {
    if !config.publish.enabled || config.pipeline.dry_run {
        return Ok(Arc::new(LocalPublisher));
    }
    let settings = GitSettings {
        root: config.root.clone(),
        branch: format!("{}{run_id}", config.publish.branch_prefix),
        base_branch: config.publish.base_branch.clone(),
        remote: config.publish.remote.clone(),
    };
    let github = match &config.vcs_token {
        Some(token) => {
            let repo = config.publish.github_repo.clone().or_else(|| {
                git::remote_url(&config.root, &config.publish.remote)
                    .and_then(|url| github::repo_from_remote(&url))
            });
            match repo {
                Some(repo) => Some(GitHubClient::new(token.clone(), &repo, config.call_timeout())?),
                None => {
                    reporting::warn("VCS_TOKEN is set but the GitHub repository is unknown; commits stay local.");
                    None
                }
            }
        }
        None => None,
    };
    Ok(Arc::new(GitPublisher::new(settings, github)))
}

/// `forgefix check-config`.
///
/// # Errors
/// Returns error if the path cannot be resolved.
pub fn handle_check_config(path: &Path) -> Result<ForgefixExit> {
    let Some(config) = load_config(path)? else {
        return Ok(ForgefixExit::InvalidConfig);
    };
    if let Err(e) = config.validate() {
        reporting::error(&format!("{e:#}"));
        return Ok(ForgefixExit::InvalidConfig);
    }

    println!("{} {}", "root:".cyan(), config.root.display());
    println!(
        "{} max_files={} workers={} dry_run={}",
        "pipeline:".cyan(),
        config.pipeline.max_files,
        config.pipeline.workers,
        config.pipeline.dry_run
    );
    let limits = config.limiter_settings();
    println!(
        "{} fix_generation={}/min publishing={}/min max_wait={}s",
        "limits:".cyan(),
        limits.fix_generation_per_minute,
        limits.publishing_per_minute,
        limits.max_wait.as_secs()
    );
    println!(
        "{} enabled={} threshold={} capacity={}",
        "memory:".cyan(),
        config.memory.enabled,
        config.memory.similarity_threshold,
        config.memory.capacity
    );
    println!("{} {} ({})", "service:".cyan(), config.service.endpoint, config.service.model);

    if config.vcs_token.is_none() {
        reporting::warn("VCS_TOKEN is not set; fixes are committed locally without a pull request.");
    }
    let missing = config.missing_credentials();
    if missing.is_empty() {
        reporting::ok("Configuration is valid.");
        Ok(ForgefixExit::Success)
    } else {
        reporting::error(&format!("Missing credentials: {}", missing.join(", ")));
        Ok(ForgefixExit::InvalidConfig)
    }
}

/// `forgefix rollback --run <id>`.
///
/// # Errors
/// Returns error if the run has no backups or a restore fails.
pub fn handle_rollback(path: &Path, run_id: &str) -> Result<ForgefixExit> {
    let root = canonical_root(path)?;
    let restored = backup::restore_run(&root, run_id)?;
    for file in &restored {
        println!("{} {}", "restored".green(), file.display());
    }
    reporting::ok(&format!(
        "Rolled back {} {} from run {run_id}",
        restored.len(),
        reporting::pluralize("file", restored.len())
    ));
    Ok(ForgefixExit::Success)
}

/// `forgefix memory [--clear]`.
///
/// # Errors
/// Returns error if clearing was requested and the store cannot be written.
pub fn handle_memory(path: &Path, clear: bool) -> Result<ForgefixExit> {
    let Some(config) = load_config(path)? else {
        return Ok(ForgefixExit::InvalidConfig);
    };
    let cache = MemoryCache::open(&config.memory_path(), config.memory_settings());
    if clear {
        cache.clear()?;
        reporting::ok("Fix memory cleared.");
    }
    reporting::print_memory_stats(&cache.stats());
    Ok(ForgefixExit::Success)
}
