//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] lob_core::CoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] lob_feed::FeedError),

    #[error("Snapshot error: {0}")]
    Rest(#[from] lob_rest::RestError),

    #[error("Engine error: {0}")]
    Engine(#[from] lob_engine::EngineError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] lob_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
