//! CLI command definitions for the `baton` binary.
//!
//! Uses clap derive macros for argument parsing.

pub mod memory;
pub mod process;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

/// Run declarative LLM workflows.
#[derive(Parser)]
#[command(name = "baton", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug/trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run one or more workflow documents.
    Process {
        /// Workflow YAML files, run in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Print a JSON result object per document instead of the summary table.
        #[arg(long)]
        json: bool,
    },

    /// Inspect or initialize the memory document.
    Memory {
        #[command(subcommand)]
        action: memory::MemoryCommand,
    },

    /// Generate shell completions.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_process_with_flags() {
        let cli = Cli::try_parse_from(["baton", "-vv", "process", "a.yaml", "b.yaml", "--json"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Process { files, json } => {
                assert_eq!(files, vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
                assert!(json);
            }
            _ => panic!("expected process"),
        }
    }

    #[test]
    fn process_requires_a_file() {
        assert!(Cli::try_parse_from(["baton", "process"]).is_err());
    }

    #[test]
    fn parses_memory_show_section() {
        let cli = Cli::try_parse_from(["baton", "memory", "show", "--section", "Notes"]).unwrap();
        match cli.command {
            Commands::Memory {
                action: memory::MemoryCommand::Show { section },
            } => assert_eq!(section.as_deref(), Some("Notes")),
            _ => panic!("expected memory show"),
        }
    }
}
