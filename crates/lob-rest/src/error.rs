//! Snapshot fetch error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

pub type RestResult<T> = Result<T, RestError>;
