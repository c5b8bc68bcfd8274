//! Request descriptor and its option set.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::SelectionCriteria;
use crate::{HuginnError, Result};

/// Default upper bound on input length, in characters.
pub const DEFAULT_MAX_INPUT_CHARS: usize = 8_000;

/// The kind of work a request asks the model to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
    /// Assign the input to a category.
    Categorize,
    /// Translate the input into `options.target_language`.
    Translate,
    /// Produce background context for the input.
    BuildContext,
    /// Score the input against a rubric.
    Score,
    /// Judge the quality of a previous answer.
    Evaluate,
    /// Name the entities mentioned in the input.
    DetectEntity,
}

impl TaskKind {
    /// Every task kind, in declaration order.
    pub const ALL: [TaskKind; 6] = [
        TaskKind::Categorize,
        TaskKind::Translate,
        TaskKind::BuildContext,
        TaskKind::Score,
        TaskKind::Evaluate,
        TaskKind::DetectEntity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Categorize => "categorize",
            TaskKind::Translate => "translate",
            TaskKind::BuildContext => "build-context",
            TaskKind::Score => "score",
            TaskKind::Evaluate => "evaluate",
            TaskKind::DetectEntity => "detect-entity",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        let needle = s.trim().to_ascii_lowercase().replace('_', "-");
        TaskKind::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| HuginnError::InvalidInput(format!("unknown task '{s}'")))
    }
}

/// Latency/cost versus quality trade-off profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Fast,
    #[default]
    Balanced,
    Accurate,
}

impl Priority {
    pub const ALL: [Priority; 3] = [Priority::Fast, Priority::Balanced, Priority::Accurate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Fast => "fast",
            Priority::Balanced => "balanced",
            Priority::Accurate => "accurate",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = HuginnError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Priority::Fast),
            "balanced" => Ok(Priority::Balanced),
            "accurate" => Ok(Priority::Accurate),
            _ => Err(HuginnError::InvalidInput(format!("unknown priority '{s}'"))),
        }
    }
}

/// Per-request options.
///
/// The `enable_*` switches are overrides: `None` defers to the
/// orchestrator's configured default for that stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    /// Sampling temperature (0.0 to 2.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Maximum number of tokens the model may produce.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// Replaces the task's built-in system instruction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Target language tag, required by the `translate` task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Pick the model by constraints instead of the task×priority matrix.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub criteria: Option<SelectionCriteria>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_translation: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_context: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_evaluation: Option<bool>,
}

/// An immutable description of one unit of model work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    /// Raw user text.
    pub input: String,
    pub task: TaskKind,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub options: RequestOptions,
}

impl RequestDescriptor {
    /// Create a request with balanced priority and default options.
    pub fn new(input: impl Into<String>, task: TaskKind) -> Self {
        Self {
            input: input.into(),
            task,
            priority: Priority::default(),
            options: RequestOptions::default(),
        }
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_output_tokens(mut self, max: u32) -> Self {
        self.options.max_output_tokens = Some(max);
        self
    }

    pub fn system_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.options.system_instruction = Some(instruction.into());
        self
    }

    pub fn target_language(mut self, tag: impl Into<String>) -> Self {
        self.options.target_language = Some(tag.into());
        self
    }

    pub fn criteria(mut self, criteria: SelectionCriteria) -> Self {
        self.options.criteria = Some(criteria);
        self
    }

    pub fn enable_translation(mut self, enabled: bool) -> Self {
        self.options.enable_translation = Some(enabled);
        self
    }

    pub fn enable_context(mut self, enabled: bool) -> Self {
        self.options.enable_context = Some(enabled);
        self
    }

    pub fn enable_evaluation(mut self, enabled: bool) -> Self {
        self.options.enable_evaluation = Some(enabled);
        self
    }

    /// Check the request is well-formed.
    ///
    /// Fails with [`HuginnError::InvalidInput`]; such failures are never
    /// retried by the task queue.
    pub fn validate(&self, max_input_chars: usize) -> Result<()> {
        if self.input.trim().is_empty() {
            return Err(HuginnError::InvalidInput("input is empty".into()));
        }
        let chars = self.input.chars().count();
        if chars > max_input_chars {
            return Err(HuginnError::InvalidInput(format!(
                "input is {chars} characters, limit is {max_input_chars}"
            )));
        }
        if let Some(t) = self.options.temperature
            && !(0.0..=2.0).contains(&t)
        {
            return Err(HuginnError::InvalidInput(format!(
                "temperature {t} outside 0.0..=2.0"
            )));
        }
        if self.options.max_output_tokens == Some(0) {
            return Err(HuginnError::InvalidInput(
                "max_output_tokens must be positive".into(),
            ));
        }
        if self.task == TaskKind::Translate
            && self
                .options
                .target_language
                .as_deref()
                .is_none_or(|t| t.trim().is_empty())
        {
            return Err(HuginnError::InvalidInput(
                "translate task requires target_language".into(),
            ));
        }
        Ok(())
    }
}
