//! Telemetry metric name constants.
//!
//! Centralised metric names for huginn operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `provider`: provider id (e.g. "openai", "groq")
//! - `model`: model id from the catalog
//! - `status`: outcome: "ok" or "error"
//! - `tier`: cache tier: "static", "volatile" or "durable"
//! - `namespace`: cache namespace (e.g. "generation", "translation")

/// Total provider invocations.
///
/// Labels: `provider`, `model`, `status` ("ok" | "error").
pub const PROVIDER_REQUESTS_TOTAL: &str = "huginn_provider_requests_total";

/// Provider invocation duration in seconds.
///
/// Labels: `provider`, `model`.
pub const PROVIDER_REQUEST_DURATION_SECONDS: &str = "huginn_provider_request_duration_seconds";

/// Times the orchestrator switched from the primary to the fallback model.
///
/// Labels: `task`.
pub const FALLBACKS_TOTAL: &str = "huginn_fallbacks_total";

/// Total retry attempts (not counting the initial call).
///
/// Labels: `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";

/// Total tokens consumed.
///
/// Labels: `provider`, `direction` ("prompt" | "completion").
pub const TOKENS_TOTAL: &str = "huginn_tokens_total";

/// Total cache hits.
///
/// Labels: `tier`, `namespace`.
pub const CACHE_HITS_TOTAL: &str = "huginn_cache_hits_total";

/// Total cache misses (all tiers missed).
///
/// Labels: `namespace`.
pub const CACHE_MISSES_TOTAL: &str = "huginn_cache_misses_total";

/// Translation stage outcomes.
///
/// Labels: `outcome` ("translated" | "not_needed" | "skipped").
pub const TRANSLATIONS_TOTAL: &str = "huginn_translations_total";

/// Context stage outcomes.
///
/// Labels: `outcome` ("used" | "not_worthwhile" | "failed").
pub const CONTEXT_LOOKUPS_TOTAL: &str = "huginn_context_lookups_total";

/// End-to-end `generate` duration in seconds.
///
/// Labels: `task`, `source` ("provider" | "cache" | "static").
pub const GENERATE_DURATION_SECONDS: &str = "huginn_generate_duration_seconds";

/// Tasks reaching a terminal state in the queue.
///
/// Labels: `status` ("completed" | "failed" | "cancelled").
pub const QUEUE_TASKS_TOTAL: &str = "huginn_queue_tasks_total";

/// Queue retries scheduled after a retryable failure.
pub const QUEUE_RETRIES_TOTAL: &str = "huginn_queue_retries_total";

/// Time a task spent from first dispatch to its terminal state, in seconds.
///
/// Labels: `status`.
pub const QUEUE_TASK_DURATION_SECONDS: &str = "huginn_queue_task_duration_seconds";
