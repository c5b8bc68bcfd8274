//! Provider registry.
//!
//! Maps provider ids (as named in the model catalog) to [`ModelProvider`]
//! implementations and wraps every invocation with a timeout, empty-reply
//! detection, and request/latency/token metrics.
//!
//! The registry makes one call per `invoke`. Choosing a fallback model on
//! failure is the orchestrator's job, not the registry's.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use super::traits::{InvokeOptions, ModelProvider};
use crate::error::Stage;
use crate::telemetry;
use crate::types::{Completion, ModelDescriptor, Usage};
use crate::{HuginnError, Result};

/// Default per-call provider timeout.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Provider id → provider.
#[derive(Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ModelProvider>>,
    timeout: Duration,
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self {
            providers: HashMap::new(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own id, replacing any previous one.
    pub fn register(&mut self, provider: Arc<dyn ModelProvider>) {
        let id = provider.id().to_owned();
        if self.providers.insert(id.clone(), provider).is_some() {
            warn!(provider = %id, "replaced previously registered provider");
        }
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn get(&self, id: &str) -> Option<&Arc<dyn ModelProvider>> {
        self.providers.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Invoke `model` through its provider.
    ///
    /// Fails with [`HuginnError::UnknownProvider`] when nothing is
    /// registered for `model.provider_id`, [`HuginnError::Timeout`] when the
    /// call exceeds the registry timeout, and [`HuginnError::EmptyResponse`]
    /// when the provider answers with blank text.
    #[instrument(name = "provider.invoke", skip(self, prompt, options), fields(provider = %model.provider_id, model = %model.id))]
    pub async fn invoke(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<Completion> {
        let provider = self
            .providers
            .get(&model.provider_id)
            .ok_or_else(|| HuginnError::UnknownProvider(model.provider_id.clone()))?;

        let start = Instant::now();
        let result = match tokio::time::timeout(
            self.timeout,
            provider.invoke(&model.id, prompt, options),
        )
        .await
        {
            Ok(Ok(completion)) if completion.text.trim().is_empty() => {
                Err(HuginnError::EmptyResponse)
            }
            Ok(result) => result,
            Err(_) => Err(HuginnError::Timeout {
                stage: Stage::Provider,
                after: self.timeout,
            }),
        };

        Self::record_request(model, start, result.is_ok());
        match &result {
            Ok(completion) => {
                if let Some(usage) = &completion.usage {
                    Self::record_token_usage(&model.provider_id, usage);
                }
                debug!(
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "provider call succeeded"
                );
            }
            Err(e) => warn!(error = %e, transient = e.is_transient(), "provider call failed"),
        }
        result
    }

    fn record_request(model: &ModelDescriptor, start: Instant, ok: bool) {
        let status = if ok { "ok" } else { "error" };
        metrics::counter!(telemetry::PROVIDER_REQUESTS_TOTAL,
            "provider" => model.provider_id.clone(),
            "model" => model.id.clone(),
            "status" => status,
        )
        .increment(1);
        metrics::histogram!(telemetry::PROVIDER_REQUEST_DURATION_SECONDS,
            "provider" => model.provider_id.clone(),
            "model" => model.id.clone(),
        )
        .record(start.elapsed().as_secs_f64());
    }

    fn record_token_usage(provider: &str, usage: &Usage) {
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "prompt",
        )
        .increment(u64::from(usage.prompt_tokens));
        metrics::counter!(telemetry::TOKENS_TOTAL,
            "provider" => provider.to_owned(),
            "direction" => "completion",
        )
        .increment(u64::from(usage.completion_tokens));
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.ids())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Fixed(&'static str, &'static str);

    #[async_trait]
    impl ModelProvider for Fixed {
        fn id(&self) -> &str {
            self.0
        }

        async fn invoke(&self, _: &str, _: &str, _: &InvokeOptions) -> Result<Completion> {
            Ok(Completion {
                text: self.1.to_owned(),
                usage: None,
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl ModelProvider for Slow {
        fn id(&self) -> &str {
            "slow"
        }

        async fn invoke(&self, _: &str, _: &str, _: &InvokeOptions) -> Result<Completion> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Completion::default())
        }
    }

    #[tokio::test]
    async fn unknown_provider_is_a_configuration_error() {
        let registry = ProviderRegistry::new();
        let err = registry
            .invoke(&ModelDescriptor::new("m", "nope"), "hi", &InvokeOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HuginnError::UnknownProvider(ref id) if id == "nope"));
    }

    #[tokio::test]
    async fn blank_reply_is_empty_response() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Fixed("p", "  \n")));
        let err = registry
            .invoke(&ModelDescriptor::new("m", "p"), "hi", &InvokeOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(err, HuginnError::EmptyResponse));
    }

    #[tokio::test(start_paused = true)]
    async fn slow_call_times_out_as_transient() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Slow));
        registry.set_timeout(Duration::from_secs(2));
        let err = registry
            .invoke(&ModelDescriptor::new("m", "slow"), "hi", &InvokeOptions::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HuginnError::Timeout {
                stage: Stage::Provider,
                ..
            }
        ));
        assert!(err.is_transient());
    }

    #[test]
    fn ids_are_sorted() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Fixed("b", "x")));
        registry.register(Arc::new(Fixed("a", "x")));
        assert_eq!(registry.ids(), ["a", "b"]);
    }
}
