//! Huginn - request orchestration, tiered caching and batch queueing for
//! LLM tasks.
//!
//! A caller describes a unit of work with a [`RequestDescriptor`] (input
//! text, [`TaskKind`], [`Priority`]). The [`Orchestrator`] answers it from
//! the cheapest place it can: a static whitelist, then the volatile and
//! durable caches, and only then a model chosen by the [`ModelRouter`](routing::ModelRouter),
//! with a fallback model if the first call fails. Input translation and
//! search-backed context enrichment run first when useful; they never fail
//! a request.
//!
//! The [`TaskQueue`](queue::TaskQueue) runs many requests with bounded
//! concurrency, a per-minute rate limit, retries with exponential backoff,
//! and cancellation.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::providers::OpenAiCompatibleProvider;
//! use huginn::{Orchestrator, Priority, RequestDescriptor, TaskKind};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let orchestrator = Orchestrator::builder()
//!         .provider(Arc::new(OpenAiCompatibleProvider::groq("gsk-your-key")?))
//!         .provider(Arc::new(OpenAiCompatibleProvider::gemini("your-key")?))
//!         .build()?;
//!
//!     let request = RequestDescriptor::new("Grab ride to Makati", TaskKind::Categorize)
//!         .priority(Priority::Fast);
//!     let result = orchestrator.generate(&request).await?;
//!     println!("{} (via {})", result.text, result.model_id);
//!     Ok(())
//! }
//! ```
//!
//! # Batch example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use huginn::queue::{QueueConfig, TaskQueue};
//! use huginn::{Orchestrator, RequestDescriptor, TaskKind};
//!
//! # async fn run(orchestrator: Orchestrator) -> huginn::Result<()> {
//! let queue = TaskQueue::new(Arc::new(orchestrator), QueueConfig::new().max_concurrent(4))?;
//! queue.start();
//! queue.enqueue_batch(
//!     ["Meralco bill", "Jollibee lunch"]
//!         .into_iter()
//!         .map(|s| RequestDescriptor::new(s, TaskKind::Categorize)),
//! );
//! queue.wait_idle().await;
//! println!("{:?}", queue.stats());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod orchestrator;
pub mod providers;
pub mod queue;
pub mod routing;
pub mod telemetry;
pub mod translate;
pub mod types;
pub mod version;

pub use error::{ErrorKind, HuginnError, Result, Stage};
pub use orchestrator::{Generator, Orchestrator, OrchestratorBuilder, OrchestratorConfig};
pub use queue::{QueueConfig, QueueEvent, QueueStats, Task, TaskId, TaskQueue, TaskStatus};
pub use types::{
    Completion, Degradation, Evaluation, GenerateResult, ModelDescriptor, Priority,
    RequestDescriptor, RequestOptions, SelectionCriteria, TaskKind, TranslationInfo, Usage,
};
pub use version::{PKG_VERSION, version_string};
