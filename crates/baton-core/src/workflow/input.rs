//! Input keywords, input resolution, and the network fetch port.
//!
//! An input string is classified once into an [`InputSource`]. The resolver
//! uses the classification to validate the plan; the step runner uses it to
//! actually load content.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use baton_types::llm::{FileInput, detect_mime, is_attachment_mime};
use baton_types::workflow::{NO_INPUT, STDIN, parse_memory_target};
use tempfile::TempPath;

use super::definition::WorkflowError;

/// What a single `input` entry refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// `NA` or an empty placeholder.
    None,
    /// `STDIN`: the running last-output value.
    Pipe,
    /// `MEMORY` or `MEMORY:<section>`.
    Memory(Option<String>),
    /// An `http://` or `https://` URL with a host.
    Url(String),
    /// A path containing glob metacharacters.
    Glob(String),
    /// A plain file path.
    File(String),
}

/// Classify one normalized input entry.
pub fn classify_input(raw: &str) -> InputSource {
    let value = raw.trim();
    if value.is_empty() || value == NO_INPUT {
        return InputSource::None;
    }
    if value == STDIN {
        return InputSource::Pipe;
    }
    if let Some(section) = parse_memory_target(value) {
        return InputSource::Memory(section.map(str::to_string));
    }
    if is_url(value) {
        return InputSource::Url(value.to_string());
    }
    if value.contains(['*', '?', '[']) {
        return InputSource::Glob(value.to_string());
    }
    InputSource::File(value.to_string())
}

/// Whether `value` is an http(s) URL with a non-empty host.
pub fn is_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("http://")
        .or_else(|| value.strip_prefix("https://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or("");
            !host.is_empty()
        }
        None => false,
    }
}

/// Resolve `path` against `base_dir` unless it is absolute.
pub fn resolve_path(base_dir: &Path, path: &str) -> PathBuf {
    let p = Path::new(path);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// Expand a glob pattern relative to `base_dir`, sorted, files only.
pub fn expand_glob(base_dir: &Path, pattern: &str) -> Result<Vec<PathBuf>, String> {
    let full = resolve_path(base_dir, pattern);
    let full = full.to_string_lossy();
    let entries = glob::glob(&full).map_err(|e| format!("invalid glob pattern '{pattern}': {e}"))?;

    let mut paths: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    paths.sort();
    Ok(paths)
}

// ---------------------------------------------------------------------------
// Resource fetching port
// ---------------------------------------------------------------------------

/// Boxed future returned by [`ResourceFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<TempPath, String>> + Send + 'a>>;

/// Downloads a network input into a temporary file.
///
/// The returned `TempPath` deletes the file when dropped; the step runner
/// holds it until the step completes. Implemented in baton-infra.
pub trait ResourceFetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a>;
}

/// Fetcher used when no network access is wired in.
pub struct NoFetcher;

impl ResourceFetcher for NoFetcher {
    fn fetch<'a>(&'a self, url: &'a str) -> FetchFuture<'a> {
        Box::pin(async move { Err(format!("network inputs are not available: {url}")) })
    }
}

// ---------------------------------------------------------------------------
// Loaded inputs
// ---------------------------------------------------------------------------

/// A text input ready to be placed into a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextInput {
    /// Where the text came from (path, URL, `STDIN`, `MEMORY:...`).
    pub label: String,
    pub content: String,
}

/// Everything a step reads, loaded.
#[derive(Debug, Default)]
pub struct LoadedInputs {
    pub texts: Vec<TextInput>,
    pub files: Vec<FileInput>,
    /// Fetched network resources; deleted when this value is dropped.
    pub temp_files: Vec<TempPath>,
}

/// Read a file from disk as either prompt text or an attachment.
pub async fn read_file_input(
    step: &str,
    path: &Path,
    label: &str,
) -> Result<Loaded, WorkflowError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| WorkflowError::StepFailed {
            step: step.to_string(),
            message: format!("failed to read input '{label}': {e}"),
        })?;

    let mime = detect_mime(path);
    if is_attachment_mime(mime) {
        return Ok(Loaded::File(FileInput::new(path, mime, bytes)));
    }

    let content = String::from_utf8(bytes).map_err(|_| WorkflowError::StepFailed {
        step: step.to_string(),
        message: format!("input '{label}' is not valid UTF-8 text"),
    })?;
    Ok(Loaded::Text(TextInput {
        label: label.to_string(),
        content,
    }))
}

/// One loaded file.
#[derive(Debug)]
pub enum Loaded {
    Text(TextInput),
    File(FileInput),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn classify_sentinels() {
        assert_eq!(classify_input("NA"), InputSource::None);
        assert_eq!(classify_input(""), InputSource::None);
        assert_eq!(classify_input("STDIN"), InputSource::Pipe);
        assert_eq!(classify_input("MEMORY"), InputSource::Memory(None));
        assert_eq!(
            classify_input("MEMORY:Notes"),
            InputSource::Memory(Some("Notes".into()))
        );
    }

    #[test]
    fn classify_paths_and_urls() {
        assert_eq!(
            classify_input("https://example.com/a"),
            InputSource::Url("https://example.com/a".into())
        );
        assert_eq!(classify_input("docs/*.md"), InputSource::Glob("docs/*.md".into()));
        assert_eq!(classify_input("notes.txt"), InputSource::File("notes.txt".into()));
    }

    #[test]
    fn url_detection() {
        assert!(is_url("http://example.com"));
        assert!(is_url("https://example.com/path?q=1"));
        assert!(!is_url("ftp://example.com"));
        assert!(!is_url("https://"));
        assert!(!is_url("example.com"));
        assert!(!is_url("not a url"));
    }

    #[test]
    fn expand_glob_sorted_files_only() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("b.txt"), "b").unwrap();
        std::fs::write(tmp.path().join("a.txt"), "a").unwrap();
        std::fs::write(tmp.path().join("c.md"), "c").unwrap();
        std::fs::create_dir(tmp.path().join("d.txt")).unwrap();

        let paths = expand_glob(tmp.path(), "*.txt").unwrap();
        let names: Vec<String> = paths
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);

        assert!(expand_glob(tmp.path(), "*.csv").unwrap().is_empty());
    }

    #[tokio::test]
    async fn read_text_and_binary_inputs() {
        let tmp = TempDir::new().unwrap();
        let text_path = tmp.path().join("notes.txt");
        let image_path = tmp.path().join("chart.png");
        std::fs::write(&text_path, "hello").unwrap();
        std::fs::write(&image_path, [0x89, 0x50, 0x4e, 0x47]).unwrap();

        match read_file_input("s", &text_path, "notes.txt").await.unwrap() {
            Loaded::Text(t) => assert_eq!(t.content, "hello"),
            other => panic!("expected text, got {other:?}"),
        }
        match read_file_input("s", &image_path, "chart.png").await.unwrap() {
            Loaded::File(f) => assert!(f.is_image()),
            other => panic!("expected file, got {other:?}"),
        }

        let err = read_file_input("s", &tmp.path().join("missing.txt"), "missing.txt")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("missing.txt"));
    }

    #[tokio::test]
    async fn no_fetcher_refuses() {
        let err = NoFetcher.fetch("https://example.com").await.unwrap_err();
        assert!(err.contains("https://example.com"));
    }
}
