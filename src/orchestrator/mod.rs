//! The `generate` pipeline.
//!
//! One request runs these stages in order, stopping at the first definitive
//! answer:
//!
//! ```text
//! validate ─► fingerprint ─► static tier ─► volatile/durable cache
//!                                 │hit            │hit
//!                                 ▼               ▼
//!                               return          return
//!
//! ─► translate (best-effort) ─► context (best-effort) ─► select model
//! ─► primary call ─fail─► fallback call ─fail─► FallbackExhausted
//! ─► evaluation (best-effort) ─► cache write ─► return
//! ```
//!
//! Best-effort stages never fail the request; what they skipped is listed
//! in [`GenerateResult::degraded`]. Network calls within one request run
//! sequentially, each under its own timeout.

mod builder;
mod prompt;

pub use builder::OrchestratorBuilder;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheHit, Namespace, StageSwitches, TieredCache, fingerprint};
use crate::context::{ContextEnricher, ContextOptions};
use crate::error::Stage;
use crate::providers::{InvokeOptions, ProviderRegistry};
use crate::routing::ModelRouter;
use crate::telemetry;
use crate::translate::Translator;
use crate::types::{
    DEFAULT_MAX_INPUT_CHARS, Degradation, Evaluation, GenerateResult, ModelDescriptor, Priority,
    RequestDescriptor, TaskKind, TranslationInfo,
};
use crate::{HuginnError, Result};

/// `provider_id` reported for static-tier answers.
pub const WHITELIST_PROVIDER_ID: &str = "whitelist";
/// `model_id` reported for static-tier answers.
pub const WHITELIST_MODEL_ID: &str = "static";

/// Anything that turns a request into a result. The task queue runs
/// requests through this trait, so tests can substitute their own.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: &RequestDescriptor) -> Result<GenerateResult>;
}

/// Pipeline defaults; per-request options override the `enable_*` switches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Default: 8,000.
    pub max_input_chars: usize,
    /// Default: true.
    pub enable_translation: bool,
    /// Default: true.
    pub enable_context: bool,
    /// Default: false.
    pub enable_evaluation: bool,
    /// Priority used to pick the evaluation model. Default: fast.
    pub evaluation_priority: Priority,
    /// Write results to the generation cache. Default: true.
    pub cache_results: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
            enable_translation: true,
            enable_context: true,
            enable_evaluation: false,
            evaluation_priority: Priority::Fast,
            cache_results: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_input_chars(mut self, n: usize) -> Self {
        self.max_input_chars = n;
        self
    }

    pub fn enable_translation(mut self, enabled: bool) -> Self {
        self.enable_translation = enabled;
        self
    }

    pub fn enable_context(mut self, enabled: bool) -> Self {
        self.enable_context = enabled;
        self
    }

    pub fn enable_evaluation(mut self, enabled: bool) -> Self {
        self.enable_evaluation = enabled;
        self
    }

    pub fn evaluation_priority(mut self, priority: Priority) -> Self {
        self.evaluation_priority = priority;
        self
    }

    pub fn cache_results(mut self, enabled: bool) -> Self {
        self.cache_results = enabled;
        self
    }
}

/// Owns the cache, router, providers and best-effort stages for `generate`.
///
/// Built with [`Orchestrator::builder`]. Independent instances share
/// nothing unless handed the same `Arc`s.
pub struct Orchestrator {
    cache: Arc<TieredCache>,
    router: Arc<ModelRouter>,
    registry: Arc<ProviderRegistry>,
    translator: Translator,
    context: ContextEnricher,
    config: OrchestratorConfig,
    sweeper: Option<JoinHandle<()>>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn cache(&self) -> &Arc<TieredCache> {
        &self.cache
    }

    pub fn router(&self) -> &Arc<ModelRouter> {
        &self.router
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run one request through the pipeline.
    ///
    /// Identical requests racing on a cold cache are not de-duplicated:
    /// both may call the provider and both write the cache. The second
    /// write replaces the first under the same key.
    #[instrument(name = "generate", skip_all, fields(task = %request.task, priority = %request.priority))]
    pub async fn generate(&self, request: &RequestDescriptor) -> Result<GenerateResult> {
        let start = Instant::now();
        request.validate(self.config.max_input_chars)?;

        if let Some(hit) = self.cache.lookup_static(request.task, &request.input) {
            debug!("static tier hit");
            return Ok(self.finish_static(request, hit, start));
        }

        let options = &request.options;
        let stages = StageSwitches {
            translation: options
                .enable_translation
                .unwrap_or(self.config.enable_translation),
            context: options.enable_context.unwrap_or(self.config.enable_context),
            evaluation: options
                .enable_evaluation
                .unwrap_or(self.config.enable_evaluation),
        };
        let key = fingerprint(request, stages);
        if self.config.cache_results
            && let Some(hit) = self.cache.get(Namespace::Generation, &key).await
        {
            match serde_json::from_value::<GenerateResult>(hit.value) {
                Ok(mut cached) => {
                    debug!(tier = hit.tier.as_str(), "generation cache hit");
                    cached.from_cache = true;
                    cached.from_whitelist = false;
                    cached.estimated_cost = 0.0;
                    cached.usage = None;
                    cached.latency_ms = start.elapsed().as_millis() as u64;
                    record_duration(request.task, "cache", start);
                    return Ok(cached);
                }
                Err(e) => warn!(error = %e, "discarding unreadable cached result"),
            }
        }

        let mut degraded = Vec::new();

        let mut working = request.input.clone();
        let mut translation = None;
        if stages.translation && request.task != TaskKind::Translate {
            let outcome = self.translator.to_canonical(&request.input).await;
            if outcome.translated {
                working = outcome.text.clone();
                translation = Some(TranslationInfo {
                    source_language: outcome.source_language,
                    target_language: outcome.target_language,
                    text: outcome.text,
                });
            } else if let Some(reason) = outcome.skipped {
                degraded.push(Degradation {
                    stage: Stage::Translation,
                    reason,
                });
            }
        }

        let mut context = None;
        if stages.context {
            let force = request.task == TaskKind::BuildContext;
            let outcome = self
                .context
                .maybe_fetch_context(&working, ContextOptions { force })
                .await;
            if let Some(reason) = outcome.failure {
                degraded.push(Degradation {
                    stage: Stage::Context,
                    reason,
                });
            }
            context = outcome.context.filter(|_| outcome.used);
        }

        let (primary, fallback) = self.select_models(request)?;
        let prompt = prompt::build_prompt(
            request.task,
            &working,
            context.as_deref(),
            options.target_language.as_deref(),
        );
        let invoke_options = InvokeOptions {
            temperature: options.temperature,
            max_output_tokens: options.max_output_tokens,
            system_instruction: Some(
                options
                    .system_instruction
                    .clone()
                    .unwrap_or_else(|| prompt::default_system_instruction(request.task).to_owned()),
            ),
        };

        let (model, completion, used_fallback) = match self
            .invoke_timed(primary, &prompt, &invoke_options)
            .await
        {
            Ok(completion) => (primary, completion, false),
            Err(primary_err) => {
                let Some(fallback) = fallback else {
                    warn!(primary = %primary.id, error = %primary_err, "primary model failed, no distinct fallback");
                    return Err(primary_err);
                };
                metrics::counter!(telemetry::FALLBACKS_TOTAL, "task" => request.task.as_str())
                    .increment(1);
                warn!(
                    primary = %primary.id,
                    fallback = %fallback.id,
                    error = %primary_err,
                    "primary model failed, trying fallback"
                );
                match self.invoke_timed(fallback, &prompt, &invoke_options).await {
                    Ok(completion) => (fallback, completion, true),
                    Err(fallback_err) => {
                        return Err(HuginnError::FallbackExhausted {
                            primary: Box::new(primary_err),
                            fallback: Box::new(fallback_err),
                        });
                    }
                }
            }
        };

        let text = completion.text.trim().to_owned();
        let prompt_for_usage = format!(
            "{}{}",
            invoke_options.system_instruction.as_deref().unwrap_or_default(),
            prompt
        );
        let usage = prompt::usage_or_estimate(completion.usage, &prompt_for_usage, &text);
        let mut estimated_cost = model.estimate_cost(usage.total());

        let mut evaluation = None;
        if stages.evaluation && request.task != TaskKind::Evaluate {
            match self.evaluate(request.task, &working, &text).await {
                Ok((eval, cost)) => {
                    evaluation = Some(eval);
                    estimated_cost += cost;
                }
                Err(e) => {
                    warn!(error = %e, "evaluation failed");
                    degraded.push(Degradation {
                        stage: Stage::Evaluation,
                        reason: e.to_string(),
                    });
                }
            }
        }

        let result = GenerateResult {
            text,
            provider_id: model.provider_id.clone(),
            model_id: model.id.clone(),
            translation,
            context_used: context.is_some(),
            evaluation,
            from_cache: false,
            from_whitelist: false,
            used_fallback,
            latency_ms: start.elapsed().as_millis() as u64,
            estimated_cost,
            usage: completion.usage,
            degraded,
        };

        if self.config.cache_results && !result.is_degraded() {
            match serde_json::to_value(&result) {
                Ok(value) => {
                    self.cache
                        .set(Namespace::Generation, &key, value, None)
                        .await
                }
                Err(e) => warn!(error = %e, "result not cached"),
            }
        }

        record_duration(request.task, "provider", start);
        Ok(result)
    }

    fn finish_static(
        &self,
        request: &RequestDescriptor,
        hit: CacheHit,
        start: Instant,
    ) -> GenerateResult {
        let text = match hit.value {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        record_duration(request.task, "static", start);
        GenerateResult {
            text,
            provider_id: WHITELIST_PROVIDER_ID.to_owned(),
            model_id: WHITELIST_MODEL_ID.to_owned(),
            translation: None,
            context_used: false,
            evaluation: None,
            from_cache: false,
            from_whitelist: true,
            used_fallback: false,
            latency_ms: start.elapsed().as_millis() as u64,
            estimated_cost: 0.0,
            usage: None,
            degraded: Vec::new(),
        }
    }

    /// Primary model plus the first distinct model to fall back to, if any.
    ///
    /// With custom criteria the best qualifying model is primary; the
    /// fallback is the runner-up, else the matrix cell's fallback, else its
    /// primary. A candidate equal to the primary is skipped, and when none
    /// remains a primary failure is returned as-is.
    fn select_models(
        &self,
        request: &RequestDescriptor,
    ) -> Result<(&ModelDescriptor, Option<&ModelDescriptor>)> {
        let cell_primary = self.router.select(request.task, request.priority);
        let cell_fallback = self.router.select_fallback(request.task, request.priority);
        let (primary, candidates) = match &request.options.criteria {
            Some(criteria) => {
                let ranked = self.router.rank_custom(criteria);
                let primary = *ranked.first().ok_or(HuginnError::NoQualifyingModel)?;
                let mut candidates = ranked[1..].to_vec();
                candidates.extend([cell_fallback, cell_primary]);
                (primary, candidates)
            }
            None => (cell_primary, vec![cell_fallback]),
        };
        let fallback = candidates.into_iter().find(|m| m.id != primary.id);
        Ok((primary, fallback))
    }

    /// One provider call, feeding the router's latency average on success.
    async fn invoke_timed(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<crate::types::Completion> {
        let start = Instant::now();
        let completion = self.registry.invoke(model, prompt, options).await?;
        self.router.record_latency(&model.id, start.elapsed());
        Ok(completion)
    }

    /// Independent quality pass; returns the evaluation and its cost.
    async fn evaluate(&self, task: TaskKind, input: &str, answer: &str) -> Result<(Evaluation, f64)> {
        let model = self
            .router
            .select(TaskKind::Evaluate, self.config.evaluation_priority);
        let eval_prompt = prompt::evaluation_prompt(task, input, answer);
        let options = InvokeOptions::new().temperature(0.0);
        let completion = self.invoke_timed(model, &eval_prompt, &options).await?;
        let usage = prompt::usage_or_estimate(completion.usage, &eval_prompt, &completion.text);
        let evaluation = prompt::parse_evaluation(&completion.text)?;
        Ok((evaluation, model.estimate_cost(usage.total())))
    }
}

#[async_trait]
impl Generator for Orchestrator {
    async fn generate(&self, request: &RequestDescriptor) -> Result<GenerateResult> {
        Orchestrator::generate(self, request).await
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("cache", &self.cache)
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn record_duration(task: TaskKind, source: &'static str, start: Instant) {
    metrics::histogram!(telemetry::GENERATE_DURATION_SECONDS,
        "task" => task.as_str(),
        "source" => source,
    )
    .record(start.elapsed().as_secs_f64());
}

/// Default interval for the volatile-cache sweeper.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(300);
