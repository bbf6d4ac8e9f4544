//! Error types for the bulkhead layer

use thiserror::Error;

/// Main error type for the bulkhead layer
#[derive(Error, Debug)]
pub enum BulkheadError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file not found in {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown cache namespace: {0}")]
    UnknownNamespace(String),

    #[error("Batch execution failed: {0}")]
    BatchExecution(String),

    #[error("Batch window closed before this member was resolved")]
    BatchClosed,

    #[error("Upstream operation failed: {0}")]
    Upstream(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BulkheadError>;
