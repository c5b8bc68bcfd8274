//! Orchestrator results and provider responses.

use serde::{Deserialize, Serialize};

use crate::error::Stage;

/// Token usage statistics reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u64 {
        u64::from(self.prompt_tokens) + u64::from(self.completion_tokens)
    }
}

/// Raw reply from a model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Input translation that ran before the provider call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationInfo {
    /// Detected language of the original input.
    pub source_language: String,
    pub target_language: String,
    /// The translated text that was sent to the model.
    pub text: String,
}

/// Quality judgement from the evaluation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    /// 0–10.
    pub score: f32,
    pub comment: String,
}

/// A best-effort stage that was skipped or failed without failing the request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Degradation {
    pub stage: Stage,
    pub reason: String,
}

/// Everything `generate` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResult {
    pub text: String,
    pub provider_id: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationInfo>,
    pub context_used: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    pub from_cache: bool,
    pub from_whitelist: bool,
    /// The primary model failed and the fallback answered.
    #[serde(default)]
    pub used_fallback: bool,
    pub latency_ms: u64,
    pub estimated_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<Degradation>,
}

impl GenerateResult {
    /// Whether any best-effort stage was skipped or failed.
    pub fn is_degraded(&self) -> bool {
        !self.degraded.is_empty()
    }

    /// Whether the given stage degraded.
    pub fn degraded_stage(&self, stage: Stage) -> bool {
        self.degraded.iter().any(|d| d.stage == stage)
    }
}
