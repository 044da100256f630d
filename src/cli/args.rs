// src/cli/args.rs
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "forgefix",
    version,
    about = "Analyze, patch, verify, and publish code-quality fixes"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fix the highest-priority issue in each candidate file
    Run(RunArgs),
    /// Load the configuration and report problems or missing credentials
    CheckConfig {
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Restore every file backed up by a previous run
    Rollback {
        /// Run id printed at the end of `forgefix run`
        #[arg(long = "run", value_name = "RUN_ID")]
        run_id: String,
        #[arg(default_value = ".")]
        path: PathBuf,
    },
    /// Show fix-memory statistics
    Memory {
        /// Delete every stored fix
        #[arg(long)]
        clear: bool,
        #[arg(default_value = ".")]
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Repository root to scan
    #[arg(default_value = ".")]
    pub path: PathBuf,
    /// Cap on files processed this run
    #[arg(long)]
    pub max_files: Option<usize>,
    /// Concurrent file workers
    #[arg(long)]
    pub workers: Option<usize>,
    /// Validate patches without writing or publishing
    #[arg(long)]
    pub dry_run: bool,
    /// Apply fixes but do not commit or open a pull request
    #[arg(long)]
    pub no_publish: bool,
    /// Print every state transition
    #[arg(long, short)]
    pub verbose: bool,
    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}
