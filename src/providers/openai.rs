//! OpenAI-compatible chat-completions client.
//!
//! Speaks `POST {base_url}/chat/completions`, which OpenAI, Groq, Gemini's
//! compatibility endpoint and most hosted gateways accept. The prompt is sent
//! as a single user message, preceded by a system message when
//! [`InvokeOptions::system_instruction`] is set.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, transport_error};
use super::traits::{InvokeOptions, ModelProvider};
use crate::types::{Completion, Usage};
use crate::{HuginnError, Result};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";

/// Chat-completions provider for any OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleProvider {
    id: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl OpenAiCompatibleProvider {
    /// `id` is the provider id the catalog refers to.
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let base_url: String = base_url.into();
        Ok(Self {
            id: id.into(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            http: build_client()?,
        })
    }

    pub fn openai(api_key: impl Into<String>) -> Result<Self> {
        Self::new("openai", OPENAI_BASE_URL, api_key)
    }

    pub fn groq(api_key: impl Into<String>) -> Result<Self> {
        Self::new("groq", GROQ_BASE_URL, api_key)
    }

    pub fn gemini(api_key: impl Into<String>) -> Result<Self> {
        Self::new("gemini", GEMINI_BASE_URL, api_key)
    }

    pub fn anthropic(api_key: impl Into<String>) -> Result<Self> {
        Self::new("anthropic", ANTHROPIC_BASE_URL, api_key)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl std::fmt::Debug for OpenAiCompatibleProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleProvider")
            .field("id", &self.id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn invoke(
        &self,
        model: &str,
        prompt: &str,
        options: &InvokeOptions,
    ) -> Result<Completion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_instruction.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_output_tokens,
        };

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, model).await?;
        let body: ChatResponse = response.json().await.map_err(transport_error)?;

        let text = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(HuginnError::EmptyResponse)?;
        Ok(Completion {
            text,
            usage: body.usage.map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
            }),
        })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<ApiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}
