//! Error types for the deskbuddy query core
//!
//! Every failure a query can hit maps to one variant here. Validator and
//! rate-limit variants are terminal and user-facing; generation and
//! retrieval variants are retried once and then degraded to a canned
//! response by the pipeline.

use thiserror::Error;

/// Main error type for the query pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Query was empty or whitespace-only
    #[error("query is empty")]
    EmptyInput,

    /// Query exceeds the configured maximum length
    #[error("query length {len} exceeds maximum {max} characters")]
    TooLong { len: usize, max: usize },

    /// Query topic falls outside the supported domain
    #[error("query is outside the supported domain: {topic}")]
    OffTopic { topic: String },

    /// Query matched a prompt-injection heuristic
    #[error("query matched injection pattern: {pattern}")]
    InjectionAttempt { pattern: String },

    /// Requester exceeded the hourly query ceiling
    #[error("rate limit of {limit} queries per hour exceeded")]
    RateLimited { limit: u32 },

    /// Generation model returned an error
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// Generation model did not answer within the configured timeout
    #[error("generation timed out after {seconds}s")]
    GenerationTimeout { seconds: u64 },

    /// Vector index or embedder unreachable
    #[error("retrieval unavailable: {0}")]
    RetrievalUnavailable(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Index snapshot load/parse errors
    #[error("index error: {0}")]
    Index(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Unexpected internal errors
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    /// Stable snake_case label recorded in `PipelineResult.error`
    pub fn label(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "empty_input",
            PipelineError::TooLong { .. } => "too_long",
            PipelineError::OffTopic { .. } => "off_topic",
            PipelineError::InjectionAttempt { .. } => "injection_attempt",
            PipelineError::RateLimited { .. } => "rate_limited",
            PipelineError::GenerationFailed(_) => "generation_failed",
            PipelineError::GenerationTimeout { .. } => "generation_timeout",
            PipelineError::RetrievalUnavailable(_) => "retrieval_unavailable",
            PipelineError::Config(_) => "config_error",
            PipelineError::Index(_) => "index_error",
            PipelineError::Http(_) => "http_error",
            PipelineError::Serialization(_) => "serialization_error",
            PipelineError::Io(_) => "io_error",
            PipelineError::Internal(_) => "internal_error",
        }
    }

    /// Whether a bounded retry is worth attempting
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            PipelineError::GenerationFailed(_)
                | PipelineError::GenerationTimeout { .. }
                | PipelineError::RetrievalUnavailable(_)
                | PipelineError::Http(_)
        )
    }
}

/// Convert anyhow errors to PipelineError
impl From<anyhow::Error> for PipelineError {
    fn from(err: anyhow::Error) -> Self {
        PipelineError::Internal(err.to_string())
    }
}
