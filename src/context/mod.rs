//! Adaptive web-context enrichment.
//!
//! [`ContextEnricher::maybe_fetch_context`] runs a search only when
//! [`entity_candidates`] finds capitalized tokens that plausibly name
//! something searchable; plain lowercase sentences never cost a search.
//! Searches are cached per query in [`Namespace::Context`], bounded by a
//! per-call timeout and retried with backoff. Every failure ends in
//! `used: false`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheKey, Namespace, TieredCache, canonicalize};
use crate::error::Stage;
use crate::providers::retry::duration_ms;
use crate::providers::{RetryConfig, SearchHit, SearchProvider, with_retry};
use crate::telemetry;
use crate::{HuginnError, Result};

/// Capitalized words that are not worth searching for.
const COMMON_CAPITALIZED: &[&str] = &[
    "I", "I'm", "I've", "The", "A", "An", "This", "That", "These", "Those", "My", "Our", "We",
    "You", "Your", "It", "He", "She", "They", "What", "Who", "Where", "When", "Why", "How", "Is",
    "Are", "Can", "Please", "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday",
    "Sunday",
];

/// Context stage settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Per-search timeout. Default: 5s.
    #[serde(with = "duration_ms")]
    pub timeout: Duration,
    /// Default: 3 attempts, 250ms initial backoff.
    pub retry: RetryConfig,
    /// Snippets kept in the context block. Default: 3.
    pub max_snippets: usize,
    /// Shortest token counted as an entity. Default: 2.
    pub min_token_len: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retry: RetryConfig::default(),
            max_snippets: 3,
            min_token_len: 2,
        }
    }
}

impl ContextConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_snippets(mut self, n: usize) -> Self {
        self.max_snippets = n;
        self
    }
}

/// Per-call switches for [`ContextEnricher::maybe_fetch_context`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextOptions {
    /// Search even when the heuristic sees no entity.
    pub force: bool,
}

/// Result of the context stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextOutcome {
    pub used: bool,
    pub context: Option<String>,
    /// The search was attempted and failed.
    pub failure: Option<String>,
}

impl ContextOutcome {
    fn unused() -> Self {
        Self::default()
    }
}

/// Best-effort search-backed context provider.
pub struct ContextEnricher {
    search: Option<Arc<dyn SearchProvider>>,
    cache: Arc<TieredCache>,
    config: ContextConfig,
}

impl ContextEnricher {
    /// With no search provider every call returns `used: false`.
    pub fn new(
        search: Option<Arc<dyn SearchProvider>>,
        cache: Arc<TieredCache>,
        config: ContextConfig,
    ) -> Self {
        Self {
            search,
            cache,
            config,
        }
    }

    pub fn config(&self) -> &ContextConfig {
        &self.config
    }

    /// Whether `text` looks worth a search.
    pub fn should_search(&self, text: &str) -> bool {
        !entity_candidates(text, self.config.min_token_len).is_empty()
    }

    #[instrument(name = "context", skip_all)]
    pub async fn maybe_fetch_context(&self, text: &str, options: ContextOptions) -> ContextOutcome {
        let Some(search) = &self.search else {
            return ContextOutcome::unused();
        };

        let entities = entity_candidates(text, self.config.min_token_len);
        let query = if !entities.is_empty() {
            entities.join(" ")
        } else if options.force {
            text.trim().to_owned()
        } else {
            metrics::counter!(telemetry::CONTEXT_LOOKUPS_TOTAL, "outcome" => "not_worthwhile")
                .increment(1);
            debug!("no entity candidates, skipping search");
            return ContextOutcome::unused();
        };
        if query.is_empty() {
            return ContextOutcome::unused();
        }

        let key = CacheKey::from_parts(Namespace::Context, &[&canonicalize(&query)]);
        if let Some(hit) = self.cache.get(Namespace::Context, &key).await
            && let Value::String(context) = hit.value
        {
            debug!(%query, "context cache hit");
            return self.outcome_from(context);
        }

        let result = with_retry(&self.config.retry, "search", || {
            self.search_once(search.as_ref(), &query)
        })
        .await;
        match result {
            Ok(hits) => {
                let context = format_hits(&hits, self.config.max_snippets);
                self.cache
                    .set(Namespace::Context, &key, Value::String(context.clone()), None)
                    .await;
                self.outcome_from(context)
            }
            Err(e) => {
                warn!(search = search.name(), %query, error = %e, "context lookup failed");
                metrics::counter!(telemetry::CONTEXT_LOOKUPS_TOTAL, "outcome" => "failed")
                    .increment(1);
                ContextOutcome {
                    used: false,
                    context: None,
                    failure: Some(e.to_string()),
                }
            }
        }
    }

    async fn search_once(&self, search: &dyn SearchProvider, query: &str) -> Result<Vec<SearchHit>> {
        tokio::time::timeout(self.config.timeout, search.search(query))
            .await
            .map_err(|_| HuginnError::Timeout {
                stage: Stage::Context,
                after: self.config.timeout,
            })?
    }

    /// An empty block means the search found nothing; cached so it is not repeated.
    fn outcome_from(&self, context: String) -> ContextOutcome {
        if context.is_empty() {
            metrics::counter!(telemetry::CONTEXT_LOOKUPS_TOTAL, "outcome" => "empty").increment(1);
            return ContextOutcome::unused();
        }
        metrics::counter!(telemetry::CONTEXT_LOOKUPS_TOTAL, "outcome" => "used").increment(1);
        ContextOutcome {
            used: true,
            context: Some(context),
            failure: None,
        }
    }
}

impl std::fmt::Debug for ContextEnricher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextEnricher")
            .field("search", &self.search.as_ref().map(|s| s.name().to_owned()))
            .field("config", &self.config)
            .finish()
    }
}

/// Capitalized tokens of at least `min_len` characters that are not common
/// sentence words, in order of appearance and without duplicates.
///
/// Tokens with an uppercase letter after the first position (`GCash`,
/// `PLDT`) always count.
pub fn entity_candidates(text: &str, min_len: usize) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for raw in text.split_whitespace() {
        let token = raw.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'' && c != '&');
        let token = token.trim_end_matches("'s");
        if token.chars().count() < min_len {
            continue;
        }
        let mut chars = token.chars();
        let Some(first) = chars.next() else {
            continue;
        };
        let inner_upper = chars.any(char::is_uppercase);
        let capitalized = first.is_uppercase();
        if !(capitalized || (inner_upper && first.is_alphanumeric())) {
            continue;
        }
        if !inner_upper && COMMON_CAPITALIZED.contains(&token) {
            continue;
        }
        if !found.iter().any(|f| f == token) {
            found.push(token.to_owned());
        }
    }
    found
}

fn format_hits(hits: &[SearchHit], max: usize) -> String {
    hits.iter()
        .filter(|h| !h.snippet.trim().is_empty())
        .take(max)
        .map(|h| format!("- {}: {}", h.title.trim(), h.snippet.trim()))
        .collect::<Vec<_>>()
        .join("\n")
}
