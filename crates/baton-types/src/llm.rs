//! Provider gateway request types for baton.
//!
//! These model the narrow contract between the engine and a model provider:
//! a prompt addressed to a model (optionally with an attached file) in, text out.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Which provider API a request should go through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    /// Chat-completions style request.
    #[default]
    Chat,
    /// OpenAI Responses API request (`type: openai-responses`).
    Responses,
}

/// Provider-extended fields carried from the step configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PromptOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_response_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default)]
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
    #[serde(default)]
    pub api: ApiMode,
}

/// A single prompt addressed to one model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default)]
    pub options: PromptOptions,
}

impl PromptRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            options: PromptOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PromptOptions) -> Self {
        self.options = options;
        self
    }
}

/// A binary file attached to a prompt (images, PDFs).
#[derive(Clone)]
pub struct FileInput {
    pub path: PathBuf,
    pub mime: String,
    pub data: Vec<u8>,
}

impl FileInput {
    pub fn new(path: impl Into<PathBuf>, mime: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            mime: mime.into(),
            data,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.starts_with("image/")
    }

    pub fn is_pdf(&self) -> bool {
        self.mime == "application/pdf"
    }

    /// File name for display and provider metadata.
    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
    }
}

// Raw bytes are left out of Debug output.
impl fmt::Debug for FileInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileInput")
            .field("path", &self.path)
            .field("mime", &self.mime)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Detect a MIME type from a file extension.
///
/// Unknown extensions map to `application/octet-stream`; callers decide
/// whether that content is still readable as text.
pub fn detect_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "xml" => "text/xml",
        "yaml" | "yml" => "text/yaml",
        "toml" => "text/toml",
        "json" => "application/json",
        "rs" | "py" | "js" | "ts" | "go" | "java" | "c" | "h" | "cpp" | "sh" | "sql" => {
            "text/x-source"
        }

        "pdf" => "application/pdf",

        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",

        _ => "application/octet-stream",
    }
}

/// Whether content of this MIME type must be sent as an attachment rather
/// than inlined into the prompt text.
pub fn is_attachment_mime(mime: &str) -> bool {
    mime.starts_with("image/") || mime == "application/pdf"
}

/// Errors from provider gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("no provider configured for model '{0}'")]
    UnknownModel(String),

    #[error("unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_mime() {
        assert_eq!(detect_mime(Path::new("notes.md")), "text/markdown");
        assert_eq!(detect_mime(Path::new("photo.JPG")), "image/jpeg");
        assert_eq!(detect_mime(Path::new("paper.pdf")), "application/pdf");
        assert_eq!(detect_mime(Path::new("Makefile")), "application/octet-stream");
    }

    #[test]
    fn test_is_attachment_mime() {
        assert!(is_attachment_mime("image/png"));
        assert!(is_attachment_mime("application/pdf"));
        assert!(!is_attachment_mime("text/plain"));
        assert!(!is_attachment_mime("application/octet-stream"));
    }

    #[test]
    fn test_file_input_debug_hides_bytes() {
        let file = FileInput::new("a.png", "image/png", vec![1, 2, 3]);
        let debug = format!("{file:?}");
        assert!(debug.contains("len: 3"), "got: {debug}");
        assert!(file.is_image());
        assert_eq!(file.file_name(), "a.png");
    }

    #[test]
    fn test_prompt_options_skip_empty_fields() {
        let request = PromptRequest::new("gpt-4o", "hi");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "gpt-4o");
        assert!(json["options"].get("instructions").is_none());
        assert_eq!(json["options"]["api"], "chat");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::UnknownModel("mystery-1".into());
        assert!(err.to_string().contains("mystery-1"));
    }
}
