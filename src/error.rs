//! Huginn error types

use std::time::Duration;

/// Which pipeline stage a timeout or degradation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Translation,
    Context,
    Provider,
    Evaluation,
    Cache,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Translation => "translation",
            Stage::Context => "context",
            Stage::Provider => "provider",
            Stage::Evaluation => "evaluation",
            Stage::Cache => "cache",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Huginn error types
#[derive(Debug, thiserror::Error)]
pub enum HuginnError {
    // Provider/network errors
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("{stage} call timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("empty response from model")]
    EmptyResponse,

    /// Primary and fallback model both failed; no further fallback exists.
    #[error("primary model failed ({primary}); fallback model failed ({fallback})")]
    FallbackExhausted {
        primary: Box<HuginnError>,
        fallback: Box<HuginnError>,
    },

    // Request errors
    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no model satisfies the selection criteria")]
    NoQualifyingModel,

    #[error("no provider registered with id '{0}'")]
    UnknownProvider(String),

    // Lifecycle
    #[error("cancelled")]
    Cancelled,

    // Storage / data
    #[error("storage error: {0}")]
    Storage(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error category used by callers and the task queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, timeout or rate-limit failure; worth retrying.
    TransientProvider,
    /// Provider rejected the call for a reason retrying won't fix.
    Provider,
    /// Malformed request.
    Validation,
    /// Router or setup problem.
    Configuration,
    Cancelled,
    Internal,
}

impl HuginnError {
    /// Map this error onto the coarse [`ErrorKind`] taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HuginnError::Http(_)
            | HuginnError::RateLimited { .. }
            | HuginnError::Timeout { .. } => ErrorKind::TransientProvider,
            HuginnError::Api { status, .. } if *status >= 500 => ErrorKind::TransientProvider,
            HuginnError::Api { .. }
            | HuginnError::AuthenticationFailed
            | HuginnError::ModelNotFound(_)
            | HuginnError::EmptyResponse => ErrorKind::Provider,
            HuginnError::FallbackExhausted { primary, fallback } => {
                if primary.is_transient() || fallback.is_transient() {
                    ErrorKind::TransientProvider
                } else {
                    ErrorKind::Provider
                }
            }
            HuginnError::InvalidInput(_) => ErrorKind::Validation,
            HuginnError::Configuration(_)
            | HuginnError::NoQualifyingModel
            | HuginnError::UnknownProvider(_) => ErrorKind::Configuration,
            HuginnError::Cancelled => ErrorKind::Cancelled,
            HuginnError::Storage(_) | HuginnError::Json(_) | HuginnError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientProvider
    }

    /// Whether the task queue may spend a retry attempt on this error.
    ///
    /// Validation, configuration and cancellation errors are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::TransientProvider | ErrorKind::Provider | ErrorKind::Internal
        )
    }

    /// Provider-supplied backoff hint, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            HuginnError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

/// Result type alias for Huginn operations
pub type Result<T> = std::result::Result<T, HuginnError>;
