use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Reasoning request timed out after {0}s")]
    Timeout(u64),

    #[error("Reasoning service not configured")]
    NotConfigured,
}

pub type ReasoningResult<T> = Result<T, ReasoningError>;
