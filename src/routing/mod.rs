//! Model selection.
//!
//! This module provides:
//! - [`ModelCatalog`]: the models the router may choose from
//! - [`ModelRouter`]: task × priority matrix lookup, plus constraint-based
//!   [`select_custom`](ModelRouter::select_custom)
//! - [`RoutingOverrides`]: per-(task, priority) replacements for the default matrix
//! - [`ModelLatency`]: EWMA of observed call latency per model
//!
//! # Default matrix
//!
//! Every (task, priority) pair names a primary and a fallback model id in
//! [`default_route`], an exhaustive `match`: adding a [`TaskKind`] or
//! [`Priority`] variant without a row fails to compile. The router resolves
//! every row against its catalog at construction, so an id the catalog does
//! not carry is a [`HuginnError::Configuration`] at startup and `select`
//! itself cannot fail.
//!
//! Overrides from configuration are resolved the same way:
//!
//! ```toml
//! [[routing.overrides]]
//! task = "categorize"
//! priority = "fast"
//! model = "gpt-4o-mini"
//! fallback = "gemini-2.0-flash"
//! ```

mod catalog;
mod latency;

pub use catalog::{ModelCatalog, ids};
pub use latency::{DEFAULT_ALPHA, ModelLatency};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{ModelDescriptor, Priority, SelectionCriteria, TaskKind};
use crate::{HuginnError, Result};

/// Built-in (primary, fallback) model ids for a task and priority.
pub fn default_route(task: TaskKind, priority: Priority) -> (&'static str, &'static str) {
    use TaskKind::*;
    use ids::*;
    match (task, priority) {
        (Categorize, Priority::Fast) => (LLAMA_8B, GEMINI_FLASH),
        (Categorize, Priority::Balanced) => (GEMINI_FLASH, GPT_4O_MINI),
        (Categorize, Priority::Accurate) => (GPT_4O, CLAUDE_SONNET),

        (Translate, Priority::Fast) => (GEMINI_FLASH, GPT_4O_MINI),
        (Translate, Priority::Balanced) => (GPT_4O_MINI, GEMINI_FLASH),
        (Translate, Priority::Accurate) => (GPT_4O, CLAUDE_SONNET),

        (BuildContext, Priority::Fast) => (LLAMA_8B, GEMINI_FLASH),
        (BuildContext, Priority::Balanced) => (LLAMA_70B, GPT_4O_MINI),
        (BuildContext, Priority::Accurate) => (CLAUDE_SONNET, GPT_4O),

        (Score, Priority::Fast) => (LLAMA_8B, GPT_4O_MINI),
        (Score, Priority::Balanced) => (GPT_4O_MINI, LLAMA_70B),
        (Score, Priority::Accurate) => (GPT_4O, CLAUDE_SONNET),

        (Evaluate, Priority::Fast) => (GPT_4O_MINI, GEMINI_FLASH),
        (Evaluate, Priority::Balanced) => (LLAMA_70B, GPT_4O_MINI),
        (Evaluate, Priority::Accurate) => (CLAUDE_SONNET, GPT_4O),

        (DetectEntity, Priority::Fast) => (LLAMA_8B, GEMINI_FLASH),
        (DetectEntity, Priority::Balanced) => (GEMINI_FLASH, LLAMA_70B),
        (DetectEntity, Priority::Accurate) => (GPT_4O, CLAUDE_SONNET),
    }
}

/// Replacement for one cell of the routing matrix.
///
/// Unset fields keep the default for that cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteOverride {
    pub task: TaskKind,
    pub priority: Priority,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub fallback: Option<String>,
}

/// Overrides applied on top of [`default_route`].
///
/// ```rust
/// # use huginn::routing::RoutingOverrides;
/// # use huginn::{Priority, TaskKind};
/// let overrides = RoutingOverrides::new()
///     .model(TaskKind::Categorize, Priority::Fast, "gpt-4o-mini")
///     .fallback(TaskKind::Categorize, Priority::Fast, "gemini-2.0-flash");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingOverrides {
    #[serde(default)]
    pub overrides: Vec<RouteOverride>,
}

impl RoutingOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&mut self, task: TaskKind, priority: Priority) -> &mut RouteOverride {
        let idx = match self
            .overrides
            .iter()
            .position(|o| o.task == task && o.priority == priority)
        {
            Some(idx) => idx,
            None => {
                self.overrides.push(RouteOverride {
                    task,
                    priority,
                    model: None,
                    fallback: None,
                });
                self.overrides.len() - 1
            }
        };
        &mut self.overrides[idx]
    }

    /// Route `task`/`priority` to `model_id` as primary.
    pub fn model(mut self, task: TaskKind, priority: Priority, model_id: impl Into<String>) -> Self {
        self.cell(task, priority).model = Some(model_id.into());
        self
    }

    /// Use `model_id` as the fallback for `task`/`priority`.
    pub fn fallback(
        mut self,
        task: TaskKind,
        priority: Priority,
        model_id: impl Into<String>,
    ) -> Self {
        self.cell(task, priority).fallback = Some(model_id.into());
        self
    }

    /// The last override for a cell wins.
    fn lookup(&self, task: TaskKind, priority: Priority) -> Option<&RouteOverride> {
        self.overrides
            .iter()
            .rev()
            .find(|o| o.task == task && o.priority == priority)
    }
}

/// Resolved catalog indices for one matrix cell.
#[derive(Debug, Clone, Copy)]
struct Route {
    primary: usize,
    fallback: usize,
}

/// Picks a model per request from a fixed catalog.
#[derive(Debug)]
pub struct ModelRouter {
    catalog: ModelCatalog,
    /// `TaskKind::ALL.len() * Priority::ALL.len()` cells, task-major.
    routes: Vec<Route>,
    latency: ModelLatency,
}

impl ModelRouter {
    /// Router over `catalog` using the default matrix.
    pub fn new(catalog: ModelCatalog) -> Result<Self> {
        Self::with_overrides(catalog, &RoutingOverrides::default())
    }

    /// Router over `catalog` with `overrides` applied.
    ///
    /// Fails if any resulting model id is missing from the catalog.
    pub fn with_overrides(catalog: ModelCatalog, overrides: &RoutingOverrides) -> Result<Self> {
        let mut routes = Vec::with_capacity(TaskKind::ALL.len() * Priority::ALL.len());
        for task in TaskKind::ALL {
            for priority in Priority::ALL {
                let (default_primary, default_fallback) = default_route(task, priority);
                let cell = overrides.lookup(task, priority);
                let primary = cell
                    .and_then(|c| c.model.as_deref())
                    .unwrap_or(default_primary);
                let fallback = cell
                    .and_then(|c| c.fallback.as_deref())
                    .unwrap_or(default_fallback);
                let resolve = |id: &str| {
                    catalog.position(id).ok_or_else(|| {
                        HuginnError::Configuration(format!(
                            "route {task}/{priority} names model '{id}' which is not in the catalog"
                        ))
                    })
                };
                routes.push(Route {
                    primary: resolve(primary)?,
                    fallback: resolve(fallback)?,
                });
            }
        }

        let latency = ModelLatency::new(catalog.models().iter().map(|m| m.id.as_str()), DEFAULT_ALPHA);
        Ok(Self {
            catalog,
            routes,
            latency,
        })
    }

    fn route(&self, task: TaskKind, priority: Priority) -> Route {
        self.routes[task_index(task) * Priority::ALL.len() + priority_index(priority)]
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    /// The primary model for `task` at `priority`.
    pub fn select(&self, task: TaskKind, priority: Priority) -> &ModelDescriptor {
        &self.catalog.models()[self.route(task, priority).primary]
    }

    /// The designated fallback for `task` at `priority`.
    pub fn select_fallback(&self, task: TaskKind, priority: Priority) -> &ModelDescriptor {
        &self.catalog.models()[self.route(task, priority).fallback]
    }

    /// Highest-quality model satisfying every bound in `criteria`, or `None`.
    ///
    /// Latency is checked against the observed average when the model has
    /// been called, its catalog figure otherwise. Ties on quality go to the
    /// cheaper model, then to catalog order.
    pub fn select_custom(&self, criteria: &SelectionCriteria) -> Option<&ModelDescriptor> {
        self.rank_custom(criteria).into_iter().next()
    }

    /// Every model satisfying `criteria`, best first.
    pub fn rank_custom(&self, criteria: &SelectionCriteria) -> Vec<&ModelDescriptor> {
        let mut candidates: Vec<&ModelDescriptor> = self
            .catalog
            .models()
            .iter()
            .filter(|m| self.satisfies(m, criteria))
            .collect();
        candidates.sort_by(|a, b| {
            b.quality_score
                .total_cmp(&a.quality_score)
                .then(a.cost_per_million_units.total_cmp(&b.cost_per_million_units))
        });
        debug!(
            candidates = candidates.len(),
            ?criteria,
            "ranked models for custom criteria"
        );
        candidates
    }

    fn satisfies(&self, model: &ModelDescriptor, criteria: &SelectionCriteria) -> bool {
        let latency_ms = self
            .latency
            .average(&model.id)
            .map_or(model.typical_latency_ms, |d| d.as_millis() as u64);
        criteria
            .max_cost
            .is_none_or(|max| model.cost_per_million_units <= max)
            && criteria.max_latency_ms.is_none_or(|max| latency_ms <= max)
            && criteria
                .min_quality
                .is_none_or(|min| model.quality_score >= min)
    }

    /// Feed an observed call duration into the model's latency average.
    pub fn record_latency(&self, model_id: &str, duration: Duration) {
        self.latency.record(model_id, duration);
    }

    pub fn latency(&self) -> &ModelLatency {
        &self.latency
    }
}

fn task_index(task: TaskKind) -> usize {
    match task {
        TaskKind::Categorize => 0,
        TaskKind::Translate => 1,
        TaskKind::BuildContext => 2,
        TaskKind::Score => 3,
        TaskKind::Evaluate => 4,
        TaskKind::DetectEntity => 5,
    }
}

fn priority_index(priority: Priority) -> usize {
    match priority {
        Priority::Fast => 0,
        Priority::Balanced => 1,
        Priority::Accurate => 2,
    }
}
