// src/cli/mod.rs
//! CLI command handlers.

pub mod args;
pub mod handlers;

pub use args::{Cli, Commands, RunArgs};

use crate::exit::ForgefixExit;

/// Executes the parsed command.
pub async fn execute(command: Commands) -> ForgefixExit {
    let result = match command {
        Commands::Run(args) => handlers::handle_run(args).await,
        Commands::CheckConfig { path } => handlers::handle_check_config(&path),
        Commands::Rollback { run_id, path } => handlers::handle_rollback(&path, &run_id),
        Commands::Memory { clear, path } => handlers::handle_memory(&path, clear),
    };
    result.unwrap_or_else(|e| {
        crate::reporting::error(&format!("{e:#}"));
        ForgefixExit::Error
    })
}
