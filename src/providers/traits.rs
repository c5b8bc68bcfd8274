//! Collaborator traits for model and search backends.
//!
//! The orchestrator depends only on these shapes. A provider receives the
//! catalog model id and reports failures through [`HuginnError`](crate::HuginnError);
//! the error's [`kind`](crate::HuginnError::kind) decides whether the
//! fallback model or a retry is worth trying.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::types::Completion;

/// Sampling options forwarded to a model provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvokeOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Sent as a system message ahead of the prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,
}

impl InvokeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.max_output_tokens = Some(max);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.system_instruction = Some(instruction.into());
        self
    }
}

/// A text-generation backend.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider id, matched against [`ModelDescriptor::provider_id`](crate::ModelDescriptor).
    fn id(&self) -> &str;

    /// Run `prompt` on `model`.
    async fn invoke(&self, model: &str, prompt: &str, options: &InvokeOptions)
    -> Result<Completion>;
}

/// One search result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub snippet: String,
}

/// A web or knowledge search backend used for context enrichment.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}
