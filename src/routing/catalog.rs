//! The table of models the router chooses from.

use std::collections::HashSet;

use crate::types::ModelDescriptor;
use crate::{HuginnError, Result};

/// Model ids used by the default routing matrix.
pub mod ids {
    pub const LLAMA_8B: &str = "llama-3.1-8b-instant";
    pub const LLAMA_70B: &str = "llama-3.3-70b-versatile";
    pub const GEMINI_FLASH: &str = "gemini-2.0-flash";
    pub const GPT_4O_MINI: &str = "gpt-4o-mini";
    pub const GPT_4O: &str = "gpt-4o";
    pub const CLAUDE_SONNET: &str = "claude-3-5-sonnet-latest";
}

/// An ordered, duplicate-free list of [`ModelDescriptor`]s.
#[derive(Debug, Clone)]
pub struct ModelCatalog {
    models: Vec<ModelDescriptor>,
}

impl ModelCatalog {
    /// Build a catalog; ids must be unique and the list non-empty.
    pub fn new(models: Vec<ModelDescriptor>) -> Result<Self> {
        if models.is_empty() {
            return Err(HuginnError::Configuration(
                "model catalog is empty".to_owned(),
            ));
        }
        let mut seen = HashSet::new();
        for model in &models {
            if !seen.insert(model.id.as_str()) {
                return Err(HuginnError::Configuration(format!(
                    "duplicate model id '{}' in catalog",
                    model.id
                )));
            }
        }
        Ok(Self { models })
    }

    /// The built-in table.
    ///
    /// | id | provider | $/M tokens | latency | quality |
    /// |----|----------|-----------:|--------:|--------:|
    /// | llama-3.1-8b-instant | groq | 0.05 | 250 ms | 6.5 |
    /// | llama-3.3-70b-versatile | groq | 0.59 | 600 ms | 8.0 |
    /// | gemini-2.0-flash | gemini | 0.10 | 700 ms | 7.5 |
    /// | gpt-4o-mini | openai | 0.15 | 900 ms | 7.8 |
    /// | gpt-4o | openai | 2.50 | 1800 ms | 9.0 |
    /// | claude-3-5-sonnet-latest | anthropic | 3.00 | 2000 ms | 9.2 |
    pub fn with_defaults() -> Self {
        Self {
            models: vec![
                ModelDescriptor::new(ids::LLAMA_8B, "groq")
                    .cost(0.05)
                    .latency_ms(250)
                    .quality(6.5),
                ModelDescriptor::new(ids::LLAMA_70B, "groq")
                    .cost(0.59)
                    .latency_ms(600)
                    .quality(8.0),
                ModelDescriptor::new(ids::GEMINI_FLASH, "gemini")
                    .cost(0.10)
                    .latency_ms(700)
                    .quality(7.5),
                ModelDescriptor::new(ids::GPT_4O_MINI, "openai")
                    .cost(0.15)
                    .latency_ms(900)
                    .quality(7.8),
                ModelDescriptor::new(ids::GPT_4O, "openai")
                    .cost(2.50)
                    .latency_ms(1800)
                    .quality(9.0),
                ModelDescriptor::new(ids::CLAUDE_SONNET, "anthropic")
                    .cost(3.00)
                    .latency_ms(2000)
                    .quality(9.2),
            ],
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|m| m.id == id)
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.models.iter().position(|m| m.id == id)
    }

    pub fn models(&self) -> &[ModelDescriptor] {
        &self.models
    }

    /// Distinct provider ids referenced by the catalog, in first-seen order.
    pub fn provider_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.models
            .iter()
            .map(|m| m.provider_id.as_str())
            .filter(|p| seen.insert(*p))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

impl Default for ModelCatalog {
    fn default() -> Self {
        Self::with_defaults()
    }
}
