//! Mock providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use huginn::providers::{InvokeOptions, ModelProvider, SearchHit, SearchProvider};
use huginn::{Completion, HuginnError, Result, Usage};

type Responder = Box<dyn Fn(&str, &str) -> Result<Completion> + Send + Sync>;

/// Model provider that answers through a closure and records every call.
pub struct ScriptedProvider {
    id: &'static str,
    calls: AtomicU32,
    prompts: Mutex<Vec<(String, String)>>,
    respond: Responder,
}

impl ScriptedProvider {
    /// `respond(model, prompt)` decides each reply.
    pub fn new(
        id: &'static str,
        respond: impl Fn(&str, &str) -> Result<Completion> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        })
    }

    /// Always replies `text`.
    pub fn replying(id: &'static str, text: &'static str) -> Arc<Self> {
        Self::new(id, move |_, _| Ok(completion(text)))
    }

    /// Always fails with a transient HTTP error.
    pub fn failing(id: &'static str) -> Arc<Self> {
        Self::new(id, |_, _| Err(HuginnError::Http("connection refused".into())))
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// (model, prompt) pairs in call order.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn id(&self) -> &str {
        self.id
    }

    async fn invoke(&self, model: &str, prompt: &str, _options: &InvokeOptions) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push((model.to_owned(), prompt.to_owned()));
        (self.respond)(model, prompt)
    }
}

pub fn completion(text: &str) -> Completion {
    Completion {
        text: text.to_owned(),
        usage: Some(Usage {
            prompt_tokens: 100,
            completion_tokens: 10,
        }),
    }
}

/// Search provider with a fixed answer.
pub struct StaticSearch {
    calls: AtomicU32,
    hits: Option<Vec<SearchHit>>,
}

impl StaticSearch {
    pub fn with_hits(hits: Vec<SearchHit>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            hits: Some(hits),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            hits: None,
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SearchProvider for StaticSearch {
    fn name(&self) -> &str {
        "static-search"
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.hits
            .clone()
            .ok_or_else(|| HuginnError::Api {
                status: 503,
                message: "search unavailable".into(),
            })
    }
}
