//! Serper web search client.
//!
//! See: <https://serper.dev>

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, check_status, transport_error};
use super::traits::{SearchHit, SearchProvider};
use crate::Result;

pub const SERPER_BASE_URL: &str = "https://google.serper.dev";

/// Default number of organic results requested.
const DEFAULT_RESULTS: u32 = 5;

#[derive(Clone)]
pub struct SerperSearchProvider {
    api_key: String,
    base_url: String,
    results: u32,
    http: Client,
}

impl SerperSearchProvider {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, SERPER_BASE_URL)
    }

    /// Custom base URL (wiremock in tests).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let base_url: String = base_url.into();
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_owned(),
            results: DEFAULT_RESULTS,
            http: build_client()?,
        })
    }

    pub fn results(mut self, n: u32) -> Self {
        self.results = n.max(1);
        self
    }
}

impl std::fmt::Debug for SerperSearchProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerperSearchProvider")
            .field("base_url", &self.base_url)
            .field("results", &self.results)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SearchProvider for SerperSearchProvider {
    fn name(&self) -> &str {
        "serper"
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .header("X-API-KEY", &self.api_key)
            .json(&SearchRequest {
                q: query,
                num: self.results,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, "search").await?;
        let body: SearchResponse = response.json().await.map_err(transport_error)?;
        Ok(body
            .organic
            .into_iter()
            .map(|r| SearchHit {
                title: r.title,
                snippet: r.snippet,
            })
            .collect())
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    q: &'a str,
    num: u32,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    organic: Vec<OrganicResult>,
}

#[derive(Deserialize)]
struct OrganicResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}
