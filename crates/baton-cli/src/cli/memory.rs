//! Memory document CLI commands: init and show.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Subcommand;
use console::style;

use baton_core::memory::manager::MemoryManager;
use baton_infra::memory_path::{MEMORY_ENV, init_memory_file};

use crate::state::AppState;

#[derive(Subcommand)]
pub enum MemoryCommand {
    /// Create the memory document from the default template.
    Init,

    /// Print the memory document, or one section of it.
    Show {
        /// Section name (the text after `## `).
        #[arg(long)]
        section: Option<String>,
    },
}

pub async fn handle_memory_command(cmd: MemoryCommand, state: &AppState) -> Result<()> {
    match cmd {
        MemoryCommand::Init => handle_init(state).await,
        MemoryCommand::Show { section } => handle_show(state, section.as_deref()).await,
    }
}

async fn handle_init(state: &AppState) -> Result<()> {
    let env_override = std::env::var(MEMORY_ENV).ok();
    let path = state.memory_lookup(env_override.as_deref()).default_path();

    let created = init_memory_file(&path)
        .await
        .with_context(|| format!("failed to create {}", path.display()))?;

    println!();
    if created {
        println!(
            "  {} Created memory file at {}",
            style("*").green().bold(),
            style(path.display()).cyan()
        );
    } else {
        println!(
            "  {} Memory file already exists at {}",
            style("i").blue().bold(),
            style(path.display()).cyan()
        );
    }
    println!();
    Ok(())
}

async fn handle_show(state: &AppState, section: Option<&str>) -> Result<()> {
    let Some(path) = state.memory_path.as_deref() else {
        println!();
        println!(
            "  {} No memory file found. Run {} to create one.",
            style("i").blue().bold(),
            style("baton memory init").cyan()
        );
        println!();
        return Ok(());
    };

    let text = render_memory(path, section).await?;
    println!("{text}");
    Ok(())
}

/// The whole document, or one section's body.
async fn render_memory(path: &Path, section: Option<&str>) -> Result<String> {
    let manager = MemoryManager::open(Some(path.to_path_buf()))
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    Ok(match section {
        Some(name) => manager.read_section(name).await,
        None => manager.read().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn render_whole_document_and_section() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("BATON.md");
        init_memory_file(&path).await.unwrap();

        let manager = MemoryManager::open(Some(path.clone()))
            .await
            .unwrap()
            .with_timestamp("2026-01-01 00:00:00");
        manager.write_section("Notes", "remember the milk").await.unwrap();

        let whole = render_memory(&path, None).await.unwrap();
        assert!(whole.contains("## Project Context"), "got: {whole}");
        assert!(whole.contains("remember the milk"), "got: {whole}");

        let notes = render_memory(&path, Some("Notes")).await.unwrap();
        assert!(notes.contains("remember the milk"), "got: {notes}");
        assert!(!notes.contains("Project Context"), "got: {notes}");

        assert_eq!(render_memory(&path, Some("Missing")).await.unwrap(), "");
    }
}
