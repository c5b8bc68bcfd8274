//! Configuration file loading.
//!
//! Configuration is loaded from TOML with the following resolution order:
//! 1. explicit path (e.g. `--config <path>`)
//! 2. `~/.huginn/config.toml` (user)
//! 3. `/etc/huginn/config.toml` (system)
//!
//! API keys never live in the file. Each `[[providers]]` entry names the
//! environment variable its key is read from.
//!
//! ```toml
//! [queue]
//! max_concurrent = 4
//! retry_attempts = 2
//! retry_delay = 1000            # ms
//! rate_limit_per_minute = 60
//!
//! [cache.generation]
//! max_entries = 10000
//! ttl = 86400                   # seconds
//!
//! [cache.durable]
//! kind = "file"
//! dir = "/var/cache/huginn"
//!
//! [timeouts]
//! provider = 30000              # ms
//!
//! [[routing.overrides]]
//! task = "categorize"
//! priority = "fast"
//! model = "gpt-4o-mini"
//!
//! [[providers]]
//! id = "groq"
//! api_key_env = "GROQ_API_KEY"
//!
//! [search]
//! api_key_env = "SERPER_API_KEY"
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, FileStore, MemoryStore};
use crate::context::ContextConfig;
use crate::orchestrator::{OrchestratorBuilder, OrchestratorConfig};
use crate::providers::openai::{
    ANTHROPIC_BASE_URL, GEMINI_BASE_URL, GROQ_BASE_URL, OPENAI_BASE_URL,
};
use crate::providers::retry::duration_ms;
use crate::providers::search::SERPER_BASE_URL;
use crate::providers::{
    DEFAULT_PROVIDER_TIMEOUT, OpenAiCompatibleProvider, SerperSearchProvider,
};
use crate::queue::QueueConfig;
use crate::routing::{ModelCatalog, RoutingOverrides};
use crate::translate::TranslationConfig;
use crate::types::ModelDescriptor;
use crate::{HuginnError, Result};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HuginnConfig {
    pub queue: QueueConfig,
    pub cache: CacheSection,
    pub timeouts: TimeoutsConfig,
    pub translation: TranslationConfig,
    pub context: ContextConfig,
    pub routing: RoutingOverrides,
    pub orchestrator: OrchestratorConfig,
    /// Replaces the built-in catalog when non-empty.
    pub models: Vec<ModelDescriptor>,
    pub providers: Vec<ProviderEntry>,
    pub search: Option<SearchConfig>,
}

/// `[cache]`: per-namespace limits plus the optional durable tier.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    #[serde(flatten)]
    pub namespaces: CacheConfig,
    pub durable: Option<DurableConfig>,
    /// Seconds between volatile sweeps. Unset disables the sweeper.
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DurableConfig {
    Memory {
        /// Per namespace.
        #[serde(default)]
        max_entries: Option<u64>,
    },
    File {
        /// Defaults to `~/.huginn/cache`.
        #[serde(default)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TimeoutsConfig {
    /// Per provider call, in ms.
    #[serde(with = "duration_ms")]
    pub provider: Duration,
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            provider: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// One OpenAI-compatible endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProviderEntry {
    /// Provider id the catalog refers to.
    pub id: String,
    /// Required unless `id` is one of the built-in presets.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Defaults to `<ID>_API_KEY`.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl ProviderEntry {
    pub fn key_var(&self) -> String {
        self.api_key_env.clone().unwrap_or_else(|| {
            format!("{}_API_KEY", self.id.to_uppercase().replace('-', "_"))
        })
    }

    fn resolved_base_url(&self) -> Result<&str> {
        if let Some(url) = self.base_url.as_deref() {
            return Ok(url);
        }
        match self.id.as_str() {
            "openai" => Ok(OPENAI_BASE_URL),
            "groq" => Ok(GROQ_BASE_URL),
            "gemini" => Ok(GEMINI_BASE_URL),
            "anthropic" => Ok(ANTHROPIC_BASE_URL),
            other => Err(HuginnError::Configuration(format!(
                "provider '{other}' needs a base_url"
            ))),
        }
    }
}

/// `[search]`: enables context enrichment through Serper.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key_env: String,
    pub base_url: String,
    pub results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SERPER_API_KEY".to_owned(),
            base_url: SERPER_BASE_URL.to_owned(),
            results: 5,
        }
    }
}

impl HuginnConfig {
    /// Load from the standard locations.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        Self::load_from(&path)
    }

    /// Like [`load`](Self::load), but fall back to defaults when no file
    /// exists in the standard locations. An explicit path must exist.
    pub fn load_or_default(explicit_path: Option<&Path>) -> Result<Self> {
        match Self::resolve_config_path(explicit_path) {
            Ok(path) => Self::load_from(&path),
            Err(_) if explicit_path.is_none() => {
                debug!("no config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            HuginnError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| {
            HuginnError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })?;
        config.queue.validate()?;
        debug!(?path, "loaded config");
        Ok(config)
    }

    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(HuginnError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".huginn").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/huginn/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(HuginnError::Configuration(
            "No config file found. Create ~/.huginn/config.toml or /etc/huginn/config.toml"
                .to_string(),
        ))
    }

    /// Orchestrator builder wired from this config, with keys read from the
    /// process environment.
    pub async fn orchestrator_builder(&self) -> Result<OrchestratorBuilder> {
        self.orchestrator_builder_with(|name| std::env::var(name).ok())
            .await
    }

    /// Same as [`orchestrator_builder`](Self::orchestrator_builder) with a
    /// custom key lookup. Providers whose key is missing are skipped.
    pub async fn orchestrator_builder_with(
        &self,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<OrchestratorBuilder> {
        let mut builder = OrchestratorBuilder::new()
            .provider_timeout(self.timeouts.provider)
            .cache_config(self.cache.namespaces.clone())
            .routing(self.routing.clone())
            .translation(self.translation.clone())
            .context(self.context.clone())
            .config(self.orchestrator.clone());

        if !self.models.is_empty() {
            builder = builder.catalog(ModelCatalog::new(self.models.clone())?);
        }

        for entry in &self.providers {
            let var = entry.key_var();
            let Some(key) = env(&var) else {
                warn!(provider = %entry.id, env = %var, "API key not set, provider skipped");
                continue;
            };
            let provider =
                OpenAiCompatibleProvider::new(entry.id.clone(), entry.resolved_base_url()?, key)?;
            builder = builder.provider(Arc::new(provider));
        }

        if let Some(search) = &self.search {
            match env(&search.api_key_env) {
                Some(key) => {
                    let provider = SerperSearchProvider::with_base_url(key, &search.base_url)?
                        .results(search.results);
                    builder = builder.search(Arc::new(provider));
                }
                None => warn!(
                    env = %search.api_key_env,
                    "search key not set, context enrichment disabled"
                ),
            }
        }

        match &self.cache.durable {
            Some(DurableConfig::Memory { max_entries }) => {
                let store = match max_entries {
                    Some(max) => MemoryStore::with_max_entries(*max),
                    None => MemoryStore::new(),
                };
                builder = builder.durable(Arc::new(store));
            }
            Some(DurableConfig::File { dir }) => {
                let dir = match dir.clone().or_else(FileStore::default_dir) {
                    Some(dir) => dir,
                    None => {
                        return Err(HuginnError::Configuration(
                            "no home directory for the file cache; set cache.durable.dir"
                                .to_owned(),
                        ));
                    }
                };
                builder = builder.durable(Arc::new(FileStore::open(dir).await?));
            }
            None => {}
        }

        if let Some(secs) = self.cache.sweep_interval_secs.filter(|s| *s > 0) {
            builder = builder.sweep_interval(Duration::from_secs(secs));
        }

        Ok(builder)
    }
}
