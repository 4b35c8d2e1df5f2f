//! Global configuration types for baton.
//!
//! `GlobalConfig` represents the `config.toml` in the data directory. It
//! controls provider routing, the memory file location, and chunk concurrency.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.baton/config.toml` (or `$BATON_HOME/config.toml`).
/// All fields have defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Memory document path. Relative paths resolve against the data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_file: Option<PathBuf>,

    /// Maximum number of chunk calls in flight for one step.
    #[serde(default = "default_chunk_concurrency")]
    pub chunk_concurrency: usize,

    /// Model used by `generate` steps that do not name one.
    #[serde(default = "default_generation_model")]
    pub generation_model: String,

    /// Provider routing table. Empty means "use the built-in defaults".
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

fn default_chunk_concurrency() -> usize {
    4
}

fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            memory_file: None,
            chunk_concurrency: default_chunk_concurrency(),
            generation_model: default_generation_model(),
            providers: Vec::new(),
        }
    }
}

impl GlobalConfig {
    /// Configured providers, or the built-in defaults when none are configured.
    pub fn effective_providers(&self) -> Vec<ProviderConfig> {
        if self.providers.is_empty() {
            default_providers()
        } else {
            self.providers.clone()
        }
    }
}

/// Wire protocol spoken by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
    Anthropic,
}

/// One provider entry in the routing table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Human-readable name (e.g., "openai", "ollama").
    pub name: String,
    pub kind: ProviderKind,
    /// API base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Environment variable holding the API key. `None` for keyless local servers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Model name patterns routed to this provider. A trailing `*` matches by prefix.
    #[serde(default)]
    pub models: Vec<String>,
    /// Prefix removed from the model name before it is sent (e.g., "ollama/").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strip_prefix: Option<String>,
}

impl ProviderConfig {
    /// Whether `model` is routed to this provider.
    pub fn matches(&self, model: &str) -> bool {
        self.models.iter().any(|p| matches_pattern(model, p))
    }
}

/// Match a model name against a pattern; a trailing `*` means prefix match.
pub fn matches_pattern(model: &str, pattern: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => model.starts_with(prefix),
        None => model == pattern,
    }
}

/// Built-in routing table used when `config.toml` declares no providers.
pub fn default_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: "openai".into(),
            kind: ProviderKind::OpenAiCompatible,
            base_url: "https://api.openai.com/v1".into(),
            api_key_env: Some("OPENAI_API_KEY".into()),
            models: vec!["gpt-*".into(), "o1*".into(), "o3*".into(), "o4*".into()],
            strip_prefix: None,
        },
        ProviderConfig {
            name: "anthropic".into(),
            kind: ProviderKind::Anthropic,
            base_url: "https://api.anthropic.com".into(),
            api_key_env: Some("ANTHROPIC_API_KEY".into()),
            models: vec!["claude-*".into()],
            strip_prefix: None,
        },
        ProviderConfig {
            name: "ollama".into(),
            kind: ProviderKind::OpenAiCompatible,
            base_url: "http://localhost:11434/v1".into(),
            api_key_env: None,
            models: vec!["ollama/*".into()],
            strip_prefix: Some("ollama/".into()),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_global_config_default_values() {
        let config = GlobalConfig::default();
        assert_eq!(config.chunk_concurrency, 4);
        assert_eq!(config.generation_model, "gpt-4o-mini");
        assert!(config.memory_file.is_none());
        assert!(config.providers.is_empty());
    }

    #[test]
    fn test_global_config_deserialize_with_defaults() {
        let config: GlobalConfig = toml::from_str("").unwrap();
        assert_eq!(config.chunk_concurrency, 4);
        assert_eq!(config.effective_providers().len(), 3);
    }

    #[test]
    fn test_global_config_deserialize_with_values() {
        let toml_str = r#"
memory_file = "notes/BATON.md"
chunk_concurrency = 2

[[providers]]
name = "local"
kind = "openai_compatible"
base_url = "http://localhost:8000/v1"
models = ["llama-*"]
"#;
        let config: GlobalConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.chunk_concurrency, 2);
        assert_eq!(config.memory_file, Some(PathBuf::from("notes/BATON.md")));
        let providers = config.effective_providers();
        assert_eq!(providers.len(), 1);
        assert_eq!(providers[0].kind, ProviderKind::OpenAiCompatible);
        assert!(providers[0].api_key_env.is_none());
        assert!(providers[0].matches("llama-3.1-8b"));
        assert!(!providers[0].matches("gpt-4o"));
    }

    #[test]
    fn test_matches_pattern() {
        assert!(matches_pattern("gpt-4o-mini", "gpt-*"));
        assert!(matches_pattern("o3-mini", "o3*"));
        assert!(matches_pattern("exact", "exact"));
        assert!(!matches_pattern("exact-not", "exact"));
        assert!(matches_pattern("anything", "*"));
    }

    #[test]
    fn test_default_providers_route_known_families() {
        let providers = default_providers();
        let route = |model: &str| {
            providers
                .iter()
                .find(|p| p.matches(model))
                .map(|p| p.name.as_str())
        };
        assert_eq!(route("gpt-4o"), Some("openai"));
        assert_eq!(route("claude-sonnet-4-20250514"), Some("anthropic"));
        assert_eq!(route("ollama/llama3"), Some("ollama"));
        assert_eq!(route("mystery"), None);
    }
}
