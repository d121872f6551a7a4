//! Core error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, DanmuError>;

/// Errors that can surface from a provider pipeline.
///
/// The engine absorbs all of these per provider; they never abort a sibling
/// pipeline.
#[derive(Error, Debug)]
pub enum DanmuError {
    /// A provider operation failed (network, schema mismatch, ...).
    #[error("provider error: {0}")]
    Provider(String),

    /// A payload could not be decoded into the expected shape.
    #[error("decode error: {0}")]
    Decode(String),

    /// JSON (de)serialization errors
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO errors
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl DanmuError {
    /// Create a provider error.
    pub fn provider(msg: impl Into<String>) -> Self {
        Self::Provider(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
