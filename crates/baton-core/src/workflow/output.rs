//! Output routing: `STDOUT`, the memory document, or a file.

use std::path::Path;
#[cfg(test)]
use std::sync::Mutex;

use baton_types::workflow::{STDOUT, parse_memory_target};

use super::definition::WorkflowError;
use super::input::resolve_path;
use crate::memory::manager::MemoryManager;

/// Where `STDOUT` results go.
pub trait ConsoleSink: Send + Sync {
    fn write_output(&self, text: &str);
}

/// Writes results to the process's standard output.
pub struct StdoutSink;

impl ConsoleSink for StdoutSink {
    fn write_output(&self, text: &str) {
        println!("{text}");
    }
}

/// Keeps results in memory instead of printing them.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct CaptureSink {
    outputs: Mutex<Vec<String>>,
}

#[cfg(test)]
impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outputs(&self) -> Vec<String> {
        self.outputs
            .lock()
            .map(|outputs| outputs.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[cfg(test)]
impl ConsoleSink for CaptureSink {
    fn write_output(&self, text: &str) {
        let mut outputs = self
            .outputs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        outputs.push(text.to_string());
    }
}

/// Writes one result to one declared output target.
pub struct OutputWriter<'a> {
    pub sink: &'a dyn ConsoleSink,
    pub memory: &'a MemoryManager,
    pub base_dir: &'a Path,
}

impl OutputWriter<'_> {
    /// Route `content` for `step` to `target`.
    ///
    /// Memory failures are logged and swallowed; file failures are errors.
    pub async fn write(&self, step: &str, target: &str, content: &str) -> Result<(), WorkflowError> {
        let target = target.trim();
        if target.is_empty() {
            tracing::debug!(step, "empty output target, result discarded");
            return Ok(());
        }

        if target == STDOUT {
            self.sink.write_output(content);
            return Ok(());
        }

        if let Some(section) = parse_memory_target(target) {
            let result = match section {
                Some(section) => self.memory.write_section(section, content).await,
                None => self.memory.append(content).await,
            };
            if let Err(err) = result {
                tracing::warn!(step, target, error = %err, "memory write failed, continuing without persisting");
            }
            return Ok(());
        }

        let path = resolve_path(self.base_dir, target);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| WorkflowError::StepFailed {
                step: step.to_string(),
                message: format!("failed to write output '{target}': {e}"),
            })?;
        tracing::debug!(step, path = %path.display(), bytes = content.len(), "wrote output file");
        Ok(())
    }
}
