//! Error types for the ragline pipeline.
//!
//! This module defines a unified error enum covering every error category in
//! the system: configuration, index state, bus protocol violations, polling
//! timeouts, and upstream dependency failures.

use thiserror::Error;

/// Unified error type for the ragline pipeline.
///
/// All fallible functions in the workspace return `Result<T, AppError>`.
/// Errors are represented and propagated, never panicked on.
#[derive(Error, Debug)]
pub enum AppError {
    /// Fatal configuration problems: dimension mismatch, missing index with
    /// rebuild disabled, unparseable settings. Aborts startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Rebuild was requested but the metadata store holds no documents
    #[error("No metadata to rebuild from: {0}")]
    NoMetadata(String),

    /// The index was queried before `build` or `load`
    #[error("Index queried before build or load")]
    NotBuilt,

    /// A bus payload that could not be decoded at all. Logged and dropped;
    /// the receiving loop continues.
    #[error("Malformed bus message: {0}")]
    MalformedMessage(String),

    /// A decodable payload missing a required field. The stage answers with
    /// a failed response record so the poller terminates deterministically.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// The poll budget was exhausted without a response record appearing.
    /// Recoverable: the caller gave up, the request may still complete.
    #[error("Timed out after {attempts} poll attempts")]
    Timeout { attempts: u32 },

    /// Embedding, generation, or index dependency failure. Converted to a
    /// failed response record inside stage loops, never a crash.
    #[error("Upstream dependency failed: {0}")]
    Upstream(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
