//! Adapter error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ProviderError>;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("invalid id string: {0}")]
    InvalidId(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("xml error: {0}")]
    XmlError(String),
    #[error("unexpected payload: {0}")]
    UnexpectedPayload(String),
    #[error("other: {0}")]
    Other(String),
}

impl From<ProviderError> for danmu_core::DanmuError {
    fn from(e: ProviderError) -> Self {
        danmu_core::DanmuError::Provider(e.to_string())
    }
}
