//! MemoryManager -- the persistent, section-structured memory document.
//!
//! The document is plain markdown. Sections are delimited by `## <name>`
//! header lines; the first matching header is the canonical one. Every write
//! stamps a `*Updated: <timestamp>*` line.
//!
//! The in-memory copy sits behind a `tokio::sync::RwLock`. Writers hold the
//! write guard across the file write, and the in-memory copy is only swapped
//! after the file write succeeds, so readers never see a half-applied update.

use std::path::{Path, PathBuf};

use baton_types::memory::MemoryError;
use tokio::sync::RwLock;

/// Environment variable that pins the timestamp written into the document.
pub const TIMESTAMP_ENV: &str = "BATON_TIMESTAMP";

/// Title used when a section is written into an empty document.
const DOCUMENT_TITLE: &str = "# Project Memory";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Shared owner of the memory document.
#[derive(Debug)]
pub struct MemoryManager {
    path: Option<PathBuf>,
    content: RwLock<String>,
    timestamp_override: Option<String>,
}

impl MemoryManager {
    /// Create a manager for `path` (or a disabled manager for `None`).
    ///
    /// The timestamp override is read from `BATON_TIMESTAMP` once, here.
    /// Content is empty until [`MemoryManager::load`] is called.
    pub fn new(path: Option<PathBuf>) -> Self {
        let timestamp_override = std::env::var(TIMESTAMP_ENV)
            .ok()
            .filter(|ts| !ts.is_empty());
        Self {
            path,
            content: RwLock::new(String::new()),
            timestamp_override,
        }
    }

    /// Pin the timestamp written by `append` and `write_section`.
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp_override = Some(timestamp.into());
        self
    }

    /// Create a manager and load its document in one go.
    pub async fn open(path: Option<PathBuf>) -> Result<Self, MemoryError> {
        let manager = Self::new(path);
        manager.load().await?;
        Ok(manager)
    }

    /// Read the backing file into memory. A missing file is empty content.
    pub async fn load(&self) -> Result<(), MemoryError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let loaded = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "memory file does not exist yet");
                String::new()
            }
            Err(err) => return Err(io_error(path, &err)),
        };

        *self.content.write().await = loaded;
        Ok(())
    }

    /// Whether a backing file is configured.
    pub fn has_memory(&self) -> bool {
        self.path.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The whole document.
    pub async fn read(&self) -> String {
        self.content.read().await.clone()
    }

    /// Trimmed body of the first `## <name>` section, or `""` if absent.
    pub async fn read_section(&self, name: &str) -> String {
        let content = self.content.read().await;
        extract_section(&content, name)
    }

    /// Append a timestamped delimiter followed by `content`, then persist.
    pub async fn append(&self, content: &str) -> Result<(), MemoryError> {
        let path = self.path.as_ref().ok_or(MemoryError::NotConfigured)?;
        let mut guard = self.content.write().await;

        let mut updated = String::with_capacity(guard.len() + content.len() + 48);
        updated.push_str(&guard);
        updated.push_str(&format!("\n---\n*Updated: {}*\n\n", self.timestamp()));
        updated.push_str(content);
        if !content.ends_with('\n') {
            updated.push('\n');
        }

        persist(path, &updated).await?;
        *guard = updated;
        Ok(())
    }

    /// Replace (or create) the `## <name>` section with `content`, then persist.
    pub async fn write_section(&self, name: &str, content: &str) -> Result<(), MemoryError> {
        let path = self.path.as_ref().ok_or(MemoryError::NotConfigured)?;
        let mut guard = self.content.write().await;

        let updated = replace_section(&guard, name, content, &self.timestamp());

        persist(path, &updated).await?;
        *guard = updated;
        Ok(())
    }

    fn timestamp(&self) -> String {
        self.timestamp_override.clone().unwrap_or_else(|| {
            chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
        })
    }
}

fn section_header(name: &str) -> String {
    format!("## {name}")
}

fn is_header(line: &str) -> bool {
    line.starts_with("## ")
}

fn is_target_header(line: &str, header: &str) -> bool {
    line.trim_end() == header
}

/// Body of the first section named `name`, trimmed, without its
/// `*Updated: ..*` stamp line.
fn extract_section(content: &str, name: &str) -> String {
    let header = section_header(name);
    let mut lines = content.split('\n');

    if !lines.by_ref().any(|line| is_target_header(line, &header)) {
        return String::new();
    }

    let body = lines
        .take_while(|line| !is_header(line))
        .collect::<Vec<_>>()
        .join("\n");
    strip_stamp(body.trim()).trim().to_string()
}

fn strip_stamp(body: &str) -> &str {
    let (first, rest) = body.split_once('\n').unwrap_or((body, ""));
    if first.starts_with("*Updated: ") && first.ends_with('*') {
        rest
    } else {
        body
    }
}

/// New document text with section `name` replaced by `content`.
fn replace_section(current: &str, name: &str, content: &str, timestamp: &str) -> String {
    let header = section_header(name);
    let stamp = format!("*Updated: {timestamp}*");

    if current.trim().is_empty() {
        return [DOCUMENT_TITLE, "", header.as_str(), stamp.as_str(), "", content].join("\n");
    }

    let mut out: Vec<&str> = Vec::new();
    let mut in_section = false;
    let mut found = false;

    for line in current.split('\n') {
        if !found && is_target_header(line, &header) {
            found = true;
            in_section = true;
            out.extend([line, stamp.as_str(), "", content]);
            continue;
        }
        if in_section {
            if is_header(line) {
                in_section = false;
                out.extend(["", line]);
            }
            continue;
        }
        out.push(line);
    }

    if !found {
        out.extend(["", header.as_str(), stamp.as_str(), "", content]);
    }

    out.join("\n")
}

async fn persist(path: &Path, content: &str) -> Result<(), MemoryError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| io_error(path, &e))?;
    }
    tokio::fs::write(path, content)
        .await
        .map_err(|e| io_error(path, &e))
}

fn io_error(path: &Path, err: &std::io::Error) -> MemoryError {
    MemoryError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
