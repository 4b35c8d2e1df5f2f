//! baton CLI entry point.
//!
//! Binary name: `baton`
//!
//! Parses CLI arguments, initializes tracing and application state, then
//! dispatches to the command handler.

mod cli;
mod state;

use clap::Parser;
use clap_complete::generate;

use baton_observe::tracing_setup::{filter_for_verbosity, init_tracing, shutdown_tracing};
use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = filter_for_verbosity(cli.verbose, cli.quiet);
    init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    let result = run(cli).await;
    shutdown_tracing();
    result
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        // Shell completions don't need app state
        Commands::Completions { shell } => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            generate(shell, &mut cmd, "baton", &mut std::io::stdout());
        }
        Commands::Process { files, json } => {
            let state = AppState::init().await?;
            cli::process::handle_process(&state, &files, json).await?;
        }
        Commands::Memory { action } => {
            let state = AppState::init().await?;
            cli::memory::handle_memory_command(action, &state).await?;
        }
    }

    Ok(())
}
