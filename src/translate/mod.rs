//! Language detection and input translation.
//!
//! [`Translator::translate_if_needed`] never fails: when detection, the
//! model call, or the cache misbehaves it hands back the original text with
//! [`TranslationOutcome::skipped`] explaining why. Translations are cached
//! in the [`Namespace::Translation`] namespace, whose defaults (6 hours,
//! 500 entries, oldest-by-insertion eviction) come from
//! [`CacheConfig`](crate::cache::CacheConfig).

mod detect;

pub use detect::{CANONICAL_LANGUAGE, detect_language, language_name, primary_subtag};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, Namespace, TieredCache, canonicalize};
use crate::error::Stage;
use crate::providers::retry::duration_ms;
use crate::providers::{InvokeOptions, ProviderRegistry, RetryConfig, with_retry};
use crate::routing::ModelRouter;
use crate::telemetry;
use crate::types::{Completion, ModelDescriptor, Priority, TaskKind};
use crate::{HuginnError, Result};

/// Translation stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Working language of the prompts. Default: `"en"`.
    pub canonical_language: String,
    /// Priority used to pick the translation model. Default: fast.
    pub priority: Priority,
    /// Per-call timeout. Default: 10s.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            canonical_language: CANONICAL_LANGUAGE.to_owned(),
            priority: Priority::Fast,
            timeout: Duration::from_secs(10),
            retry: RetryConfig::new().max_attempts(2),
        }
    }
}

impl TranslationConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonical_language(mut self, tag: impl Into<String>) -> Self {
        self.canonical_language = tag.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

/// What `translate_if_needed` did.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationOutcome {
    /// Text to continue with: translated, or the original.
    pub text: String,
    pub source_language: String,
    pub target_language: String,
    /// A translation was produced (from the model or the cache).
    pub translated: bool,
    /// Translation was needed but could not be produced.
    pub skipped: Option<String>,
}

impl TranslationOutcome {
    fn unchanged(text: &str, source: &str, target: &str, skipped: Option<String>) -> Self {
        Self {
            text: text.to_owned(),
            source_language: source.to_owned(),
            target_language: target.to_owned(),
            translated: false,
            skipped,
        }
    }
}

/// Cache-backed translator.
pub struct Translator {
    registry: Arc<ProviderRegistry>,
    router: Arc<ModelRouter>,
    cache: Arc<TieredCache>,
    config: TranslationConfig,
}

impl Translator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        router: Arc<ModelRouter>,
        cache: Arc<TieredCache>,
        config: TranslationConfig,
    ) -> Self {
        Self {
            registry,
            router,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &TranslationConfig {
        &self.config
    }

    /// Translate into the canonical language when the input is not in it.
    pub async fn to_canonical(&self, text: &str) -> TranslationOutcome {
        let target = self.config.canonical_language.clone();
        self.translate_if_needed(text, &target).await
    }

    /// Translate `text` into `target_language`, or return it unchanged when it is
    /// already in `target_language`.
    #[instrument(name = "translate", skip(self, text))]
    pub async fn translate_if_needed(&self, text: &str, target_language: &str) -> TranslationOutcome {
        let target = primary_subtag(target_language);
        let source = detect_language(text);
        if source == target {
            metrics::counter!(telemetry::TRANSLATIONS_TOTAL, "outcome" => "not_needed").increment(1);
            return TranslationOutcome::unchanged(text, source, &target, None);
        }

        let key = CacheKey::from_parts(Namespace::Translation, &[&target, &canonicalize(text)]);
        if let Some(hit) = self.cache.get(Namespace::Translation, &key).await
            && let Value::String(translated) = hit.value
        {
            debug!(source, target_language = %target, "translation cache hit");
            metrics::counter!(telemetry::TRANSLATIONS_TOTAL, "outcome" => "translated").increment(1);
            return TranslationOutcome {
                text: translated,
                source_language: source.to_owned(),
                target_language: target,
                translated: true,
                skipped: None,
            };
        }

        match self.call_model(text, source, &target).await {
            Ok(translated) => {
                self.cache
                    .set(
                        Namespace::Translation,
                        &key,
                        Value::String(translated.clone()),
                        None,
                    )
                    .await;
                metrics::counter!(telemetry::TRANSLATIONS_TOTAL, "outcome" => "translated").increment(1);
                TranslationOutcome {
                    text: translated,
                    source_language: source.to_owned(),
                    target_language: target,
                    translated: true,
                    skipped: None,
                }
            }
            Err(e) => {
                warn!(source, target_language = %target, error = %e, "translation skipped");
                metrics::counter!(telemetry::TRANSLATIONS_TOTAL, "outcome" => "skipped").increment(1);
                TranslationOutcome::unchanged(text, source, &target, Some(e.to_string()))
            }
        }
    }

    /// Primary translation model with retries, then its fallback once.
    async fn call_model(&self, text: &str, source: &str, target: &str) -> Result<String> {
        let prompt = translation_prompt(text, source, target);
        let options = InvokeOptions::new().temperature(0.0);
        let primary = self.router.select(TaskKind::Translate, self.config.priority);
        let fallback = self
            .router
            .select_fallback(TaskKind::Translate, self.config.priority);

        let completion = match with_retry(&self.config.retry, "translate", || {
            self.invoke_once(primary, &prompt, &options)
        })
        .await
        {
            Ok(c) => c,
            Err(e) if fallback.id != primary.id => {
                debug!(error = %e, fallback = %fallback.id, "translation primary failed");
                self.invoke_once(fallback, &prompt, &options).await?
            }
            Err(e) => return Err(e),
        };
        Ok(clean_reply(&completion.text))
    }

    async fn invoke_once(
        &self,
        model: &ModelDescriptor,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<Completion> {
        tokio::time::timeout(self.config.timeout, self.registry.invoke(model, prompt, options))
            .await
            .map_err(|_| HuginnError::Timeout {
                stage: Stage::Translation,
                after: self.config.timeout,
            })?
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn translation_prompt(text: &str, source: &str, target: &str) -> String {
    format!(
        "Translate the following text from {} to {}. \
         Reply with the translation only.\n\n{text}",
        language_name(source),
        language_name(target),
    )
}

/// Trim whitespace and one pair of wrapping quotes.
fn clean_reply(reply: &str) -> String {
    let trimmed = reply.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(trimmed)
        .trim()
        .to_owned()
}
