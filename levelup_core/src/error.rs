//! Error types for the levelup_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for levelup_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Local state management error
    #[error("State error: {0}")]
    State(String),

    /// Remote store transport or storage failure
    #[error("Remote store error: {0}")]
    Remote(String),

    /// Rejected import payload
    #[error("Import rejected: {0}")]
    Import(#[from] crate::snapshot::ImportError),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
