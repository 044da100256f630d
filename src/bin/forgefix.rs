// src/bin/forgefix.rs
use clap::Parser;
use forgefix_core::cli::{self, Cli};
use forgefix_core::exit::ForgefixExit;

#[tokio::main]
async fn main() -> ForgefixExit {
    let cli = Cli::parse();
    cli::execute(cli.command).await
}
