//! Application state wiring the engine to its adapters.
//!
//! AppState resolves the data directory, loads `config.toml`, discovers the
//! memory document, and builds the gateway registry once per invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;

use baton_core::llm::registry::GatewayRegistry;
use baton_core::memory::manager::MemoryManager;
use baton_core::workflow::output::StdoutSink;
use baton_core::workflow::step_runner::StepServices;
use baton_infra::config::{HOME_ENV, load_global_config, resolve_data_dir};
use baton_infra::fetch::HttpFetcher;
use baton_infra::llm::build_registry;
use baton_infra::memory_path::{MEMORY_ENV, MemoryLookup};
use baton_types::config::GlobalConfig;

/// Shared state for one CLI invocation.
pub struct AppState {
    pub data_dir: PathBuf,
    pub cwd: PathBuf,
    pub config: GlobalConfig,
    /// Discovered memory document, if any.
    pub memory_path: Option<PathBuf>,
}

impl AppState {
    /// Resolve directories and load configuration. No network or provider
    /// setup happens here.
    pub async fn init() -> anyhow::Result<Self> {
        let home = std::env::var(HOME_ENV).ok();
        let data_dir = resolve_data_dir(home.as_deref());
        let cwd = std::env::current_dir().context("failed to determine working directory")?;
        let config = load_global_config(&data_dir).await;

        let memory_env = std::env::var(MEMORY_ENV).ok();
        let memory_path = MemoryLookup {
            env_override: memory_env.as_deref(),
            configured: config.memory_file.as_deref(),
            data_dir: &data_dir,
            cwd: &cwd,
        }
        .discover();

        tracing::debug!(
            data_dir = %data_dir.display(),
            memory = ?memory_path,
            providers = config.effective_providers().len(),
            "state initialized"
        );

        Ok(Self {
            data_dir,
            cwd,
            config,
            memory_path,
        })
    }

    /// Memory lookup inputs, for commands that need the default path.
    pub fn memory_lookup<'a>(&'a self, env_override: Option<&'a str>) -> MemoryLookup<'a> {
        MemoryLookup {
            env_override,
            configured: self.config.memory_file.as_deref(),
            data_dir: &self.data_dir,
            cwd: &self.cwd,
        }
    }

    /// Open the memory document (disabled when none was discovered).
    ///
    /// An unreadable document disables memory for this invocation rather
    /// than failing it, and the file is left untouched.
    pub async fn open_memory(&self) -> MemoryManager {
        match MemoryManager::open(self.memory_path.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                tracing::warn!(error = %err, "memory file unavailable, continuing without memory");
                MemoryManager::new(None)
            }
        }
    }

    /// Build the gateway registry from the configured providers.
    pub fn gateways(&self) -> GatewayRegistry {
        build_registry(&self.config.effective_providers(), |var| {
            std::env::var(var).ok()
        })
    }

    /// Wire the services shared by every step of every document.
    pub async fn step_services(&self, base_dir: &Path) -> anyhow::Result<Arc<StepServices>> {
        let fetcher = HttpFetcher::new().context("failed to create HTTP client")?;
        Ok(Arc::new(StepServices {
            gateways: Arc::new(self.gateways()),
            memory: Arc::new(self.open_memory().await),
            fetcher: Arc::new(fetcher),
            sink: Arc::new(StdoutSink),
            base_dir: base_dir.to_path_buf(),
            chunk_concurrency: self.config.chunk_concurrency.max(1),
            generation_model: self.config.generation_model.clone(),
        }))
    }
}
