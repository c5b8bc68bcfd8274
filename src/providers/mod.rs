//! Model and search backends.
//!
//! - [`ModelProvider`] / [`SearchProvider`]: the collaborator contracts
//! - [`ProviderRegistry`]: id lookup, per-call timeout, metrics
//! - [`RetryConfig`] / [`with_retry`]: backoff for best-effort stages
//! - [`OpenAiCompatibleProvider`], [`SerperSearchProvider`]: HTTP clients

mod http;
pub mod openai;
pub mod registry;
pub mod retry;
pub mod search;
pub mod traits;

pub use openai::OpenAiCompatibleProvider;
pub use registry::{DEFAULT_PROVIDER_TIMEOUT, ProviderRegistry};
pub use retry::{RetryConfig, with_retry};
pub use search::SerperSearchProvider;
pub use traits::{InvokeOptions, ModelProvider, SearchHit, SearchProvider};
