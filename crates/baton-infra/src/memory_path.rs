//! Memory document discovery and template initialization.

use std::path::{Path, PathBuf};

use baton_types::memory::MemoryError;

/// Environment variable naming the memory document explicitly.
pub const MEMORY_ENV: &str = "BATON_MEMORY";

/// File name looked up in the working directory and its parents.
pub const MEMORY_FILE_NAME: &str = "BATON.md";

/// How many parent directories are searched above the working directory.
const MAX_PARENT_DEPTH: usize = 5;

const TEMPLATE: &str = "# Project Memory

## Project Context

## Current Status

## Key Learnings

## Notes
";

/// Inputs to memory discovery, gathered by the caller.
#[derive(Debug, Clone)]
pub struct MemoryLookup<'a> {
    /// Value of `$BATON_MEMORY`.
    pub env_override: Option<&'a str>,
    /// `memory_file` from `config.toml`.
    pub configured: Option<&'a Path>,
    pub data_dir: &'a Path,
    pub cwd: &'a Path,
}

impl MemoryLookup<'_> {
    /// Find the memory document. First hit wins; `None` disables memory.
    ///
    /// An explicit env or config path is returned even when the file does
    /// not exist yet, so `memory init` knows where to create it.
    pub fn discover(&self) -> Option<PathBuf> {
        if let Some(path) = self.env_override.map(str::trim).filter(|p| !p.is_empty()) {
            return Some(PathBuf::from(path));
        }

        if let Some(configured) = self.configured {
            return Some(if configured.is_absolute() {
                configured.to_path_buf()
            } else {
                self.data_dir.join(configured)
            });
        }

        let found = self
            .cwd
            .ancestors()
            .take(MAX_PARENT_DEPTH + 1)
            .map(|dir| dir.join(MEMORY_FILE_NAME))
            .find(|candidate| candidate.is_file());
        if found.is_some() {
            return found;
        }

        let in_data_dir = self.data_dir.join(MEMORY_FILE_NAME);
        in_data_dir.is_file().then_some(in_data_dir)
    }

    /// Where `memory init` writes when nothing was discovered.
    pub fn default_path(&self) -> PathBuf {
        self.discover()
            .unwrap_or_else(|| self.cwd.join(MEMORY_FILE_NAME))
    }
}

/// Create the memory document from the template.
///
/// Returns `false` without touching the file when it already exists.
pub async fn init_memory_file(path: &Path) -> Result<bool, MemoryError> {
    let io_err = |e: std::io::Error| MemoryError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    if tokio::fs::try_exists(path).await.map_err(io_err)? {
        tracing::debug!(path = %path.display(), "memory file already exists");
        return Ok(false);
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    tokio::fs::write(path, TEMPLATE).await.map_err(io_err)?;
    tracing::info!(path = %path.display(), "created memory file");
    Ok(true)
}
