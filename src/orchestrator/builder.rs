//! Builder for [`Orchestrator`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{Orchestrator, OrchestratorConfig};
use crate::cache::{CacheConfig, DurableStore, TieredCache, Whitelist};
use crate::clock::Clock;
use crate::context::{ContextConfig, ContextEnricher};
use crate::providers::{ModelProvider, ProviderRegistry, SearchProvider};
use crate::routing::{ModelCatalog, ModelRouter, RoutingOverrides};
use crate::translate::{TranslationConfig, Translator};
use crate::{HuginnError, Result};

/// Assembles an [`Orchestrator`].
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use huginn::Orchestrator;
/// # use huginn::providers::OpenAiCompatibleProvider;
/// # fn main() -> huginn::Result<()> {
/// let orchestrator = Orchestrator::builder()
///     .provider(Arc::new(OpenAiCompatibleProvider::groq("gsk-...")?))
///     .provider(Arc::new(OpenAiCompatibleProvider::openai("sk-...")?))
///     .build()?;
/// # Ok(())
/// # }
/// ```
///
/// Defaults: built-in model catalog and routing matrix, the default
/// whitelist, in-process cache with no durable tier, no search provider
/// (context enrichment disabled), 30s provider timeout.
pub struct OrchestratorBuilder {
    providers: Vec<Arc<dyn ModelProvider>>,
    search: Option<Arc<dyn SearchProvider>>,
    provider_timeout: Option<Duration>,
    cache: Option<Arc<TieredCache>>,
    cache_config: CacheConfig,
    whitelist: Option<Whitelist>,
    durable: Option<Arc<dyn DurableStore>>,
    clock: Option<Arc<dyn Clock>>,
    sweep_interval: Option<Duration>,
    catalog: Option<ModelCatalog>,
    routing: RoutingOverrides,
    translation: TranslationConfig,
    context: ContextConfig,
    config: OrchestratorConfig,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            search: None,
            provider_timeout: None,
            cache: None,
            cache_config: CacheConfig::default(),
            whitelist: None,
            durable: None,
            clock: None,
            sweep_interval: None,
            catalog: None,
            routing: RoutingOverrides::default(),
            translation: TranslationConfig::default(),
            context: ContextConfig::default(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Register a model provider under its [`id`](ModelProvider::id).
    pub fn provider(mut self, provider: Arc<dyn ModelProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    /// Enable context enrichment through `search`.
    pub fn search(mut self, search: Arc<dyn SearchProvider>) -> Self {
        self.search = Some(search);
        self
    }

    pub fn provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = Some(timeout);
        self
    }

    /// Use an existing cache. Overrides `cache_config`, `whitelist`,
    /// `durable` and `clock`.
    pub fn cache(mut self, cache: Arc<TieredCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Replace the default static tier. `Whitelist::new()` disables it.
    pub fn whitelist(mut self, whitelist: Whitelist) -> Self {
        self.whitelist = Some(whitelist);
        self
    }

    pub fn durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sweep expired volatile entries every `interval`. Needs a tokio runtime at `build`.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn catalog(mut self, catalog: ModelCatalog) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn routing(mut self, overrides: RoutingOverrides) -> Self {
        self.routing = overrides;
        self
    }

    pub fn translation(mut self, config: TranslationConfig) -> Self {
        self.translation = config;
        self
    }

    pub fn context(mut self, config: ContextConfig) -> Self {
        self.context = config;
        self
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Fails when no provider is registered or a route names a model
    /// missing from the catalog.
    pub fn build(self) -> Result<Orchestrator> {
        if self.providers.is_empty() {
            return Err(HuginnError::Configuration(
                "no model providers registered".to_owned(),
            ));
        }

        let mut registry = ProviderRegistry::new();
        if let Some(timeout) = self.provider_timeout {
            registry.set_timeout(timeout);
        }
        for provider in self.providers {
            registry.register(provider);
        }

        let catalog = self.catalog.unwrap_or_default();
        for provider_id in catalog.provider_ids() {
            if !registry.contains(provider_id) {
                warn!(
                    provider = provider_id,
                    "catalog references a provider that is not registered"
                );
            }
        }
        let router = Arc::new(ModelRouter::with_overrides(catalog, &self.routing)?);
        let registry = Arc::new(registry);

        let cache = match self.cache {
            Some(cache) => cache,
            None => {
                let mut cache = TieredCache::new(self.cache_config)
                    .with_whitelist(self.whitelist.unwrap_or_else(Whitelist::with_defaults));
                if let Some(store) = self.durable {
                    cache = cache.with_durable(store);
                }
                if let Some(clock) = self.clock {
                    cache = cache.with_clock(clock);
                }
                Arc::new(cache)
            }
        };
        let sweeper = self
            .sweep_interval
            .map(|interval| cache.spawn_sweeper(interval));

        let translator = Translator::new(
            registry.clone(),
            router.clone(),
            cache.clone(),
            self.translation,
        );
        let context = ContextEnricher::new(self.search, cache.clone(), self.context);

        info!(
            providers = ?registry.ids(),
            models = router.catalog().len(),
            "orchestrator ready"
        );
        Ok(Orchestrator {
            cache,
            router,
            registry,
            translator,
            context,
            config: self.config,
            sweeper,
        })
    }
}
