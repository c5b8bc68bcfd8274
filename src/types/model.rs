//! Model catalog entries and selection constraints.

use serde::{Deserialize, Serialize};

/// One model offered by one provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Model identifier passed to the provider (e.g. "gpt-4o-mini").
    pub id: String,
    /// Id of the provider registered in the [`ProviderRegistry`](crate::providers::ProviderRegistry).
    pub provider_id: String,
    /// Blended cost per million tokens (USD).
    pub cost_per_million_units: f64,
    /// Typical end-to-end latency for a short request.
    pub typical_latency_ms: u64,
    /// Subjective quality on a 0–10 scale.
    pub quality_score: f32,
}

impl ModelDescriptor {
    pub fn new(id: impl Into<String>, provider_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            provider_id: provider_id.into(),
            cost_per_million_units: 0.0,
            typical_latency_ms: 0,
            quality_score: 0.0,
        }
    }

    pub fn cost(mut self, per_million: f64) -> Self {
        self.cost_per_million_units = per_million;
        self
    }

    pub fn latency_ms(mut self, ms: u64) -> Self {
        self.typical_latency_ms = ms;
        self
    }

    pub fn quality(mut self, score: f32) -> Self {
        self.quality_score = score.clamp(0.0, 10.0);
        self
    }

    /// Estimated cost of a call that used `tokens` tokens in total.
    pub fn estimate_cost(&self, tokens: u64) -> f64 {
        tokens as f64 * self.cost_per_million_units / 1_000_000.0
    }
}

/// Bounds for constraint-based model selection.
///
/// Unset bounds do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectionCriteria {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_quality: Option<f32>,
}

impl SelectionCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_cost(mut self, cost: f64) -> Self {
        self.max_cost = Some(cost);
        self
    }

    pub fn max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = Some(ms);
        self
    }

    pub fn min_quality(mut self, quality: f32) -> Self {
        self.min_quality = Some(quality);
        self
    }
}
