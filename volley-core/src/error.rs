use thiserror::Error;

/// Reasons a run specification is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpecError {
    #[error("Missing required parameter `{0}`")]
    Missing(&'static str),

    #[error("numRequests must be at least 1")]
    ZeroRequests,

    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("concurrency must be at most {max}, got {requested}")]
    ConcurrencyTooHigh { requested: usize, max: usize },

    #[error("timeoutMs must be at least 1")]
    ZeroTimeout,

    #[error("Invalid target URL `{url}`: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Invalid HTTP method `{0}`")]
    InvalidMethod(String),

    #[error("Invalid header `{0}`")]
    InvalidHeader(String),
}
