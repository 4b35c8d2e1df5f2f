//! Global configuration loader for baton.
//!
//! Reads `config.toml` from the data directory (`~/.baton/` by default) and
//! deserializes it into [`GlobalConfig`]. Falls back to defaults when the
//! file is missing or malformed.

use std::path::{Path, PathBuf};

use baton_types::config::GlobalConfig;

/// Environment variable overriding the data directory.
pub const HOME_ENV: &str = "BATON_HOME";

/// Resolve the data directory.
///
/// `home_override` is the value of `$BATON_HOME`, passed in by the caller.
/// Without it the directory is `~/.baton`, or `./.baton` when no home
/// directory can be determined.
pub fn resolve_data_dir(home_override: Option<&str>) -> PathBuf {
    if let Some(dir) = home_override.map(str::trim).filter(|d| !d.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::home_dir()
        .map(|home| home.join(".baton"))
        .unwrap_or_else(|| PathBuf::from(".baton"))
}

/// Load global configuration from `{data_dir}/config.toml`.
///
/// - Missing file: [`GlobalConfig::default()`].
/// - Unreadable or malformed file: a warning, then the default.
pub async fn load_global_config(data_dir: &Path) -> GlobalConfig {
    let config_path = data_dir.join("config.toml");

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return GlobalConfig::default();
        }
    };

    match toml::from_str::<GlobalConfig>(&content) {
        Ok(config) => {
            if config.chunk_concurrency == 0 {
                tracing::warn!("chunk_concurrency = 0 in {} treated as 1", config_path.display());
                return GlobalConfig {
                    chunk_concurrency: 1,
                    ..config
                };
            }
            config
        }
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            GlobalConfig::default()
        }
    }
}
