//! Error types for the metrics provider and the observer registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed counters: {0}")]
    Parse(String),
    #[error("not supported on this platform")]
    Unsupported,
    #[error("sysinfo refresh panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("backlog could not be queued")]
    Backlog,
}
